use anyhow::Result;
use job_provisioner::schema::{document_from_output, Channel, Document, Episode, Link};
use serde_json::{json, Map, Value};
use std::process::Command;

#[test]
fn test_catalog_binary_lists_collections() -> Result<()> {
    let output = Command::new(env!("CARGO_BIN_EXE_schema_catalog")).output()?;
    assert!(output.status.success());

    let catalog: Vec<Value> = serde_json::from_slice(&output.stdout)?;
    let collections: Vec<&str> = catalog
        .iter()
        .filter_map(|c| c["collection"].as_str())
        .collect();
    assert_eq!(
        collections,
        vec![
            "persons",
            "channels",
            "episodes",
            "transcripts",
            "biomarkers",
            "protocols",
            "biohacks",
            "businesses",
            "products",
            "claims",
            "resources",
            "treatments",
            "case_studies",
            "success_stories",
            "compounds",
            "medical_treatments"
        ]
    );

    let episodes = catalog
        .iter()
        .find(|c| c["collection"] == "episodes")
        .expect("episodes collection");
    let channel_link = episodes["links"]
        .as_array()
        .and_then(|links| links.iter().find(|l| l["field"] == "channel"))
        .expect("channel link");
    assert_eq!(channel_link["target"], "channels");
    assert_eq!(channel_link["many"], false);

    let biomarkers = catalog
        .iter()
        .find(|c| c["collection"] == "biomarkers")
        .expect("biomarkers collection");
    let referenced_by: Vec<&str> = biomarkers["referenced_by"]
        .as_array()
        .map(|refs| refs.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    assert!(referenced_by.contains(&"treatments.biomarkers"));
    Ok(())
}

#[test]
fn test_episode_from_scraper_output() -> Result<()> {
    let scraped = json!({
        "episode_page_url": "https://podcast.example/episodes/212",
        "transcript_url": "https://podcast.example/episodes/212/transcript",
        "webpage_summary": "Sleep, light and metabolic health",
        "release_date": "2024-03-18T00:00:00Z",
        "participants": ["Host", "Guest"],
        "scraped_at": "ignored"
    });
    let mut overrides = Map::new();
    overrides.insert(
        "channel".to_string(),
        serde_json::to_value(Link::<Channel>::new("65f0aa"))?,
    );
    overrides.insert("episode_number".to_string(), json!(212));

    let episode: Episode = document_from_output(&scraped, &overrides)?;
    assert_eq!(episode.channel.id(), "65f0aa");
    assert_eq!(episode.episode_number, Some(212));
    assert_eq!(episode.participants.as_ref().map(Vec::len), Some(2));

    let stored = serde_json::to_value(&episode)?;
    assert_eq!(stored["channel"], json!({"$ref": Channel::COLLECTION, "$id": "65f0aa"}));
    assert!(stored.get("scraped_at").is_none());
    assert!(stored.get("created_at").is_some());
    Ok(())
}
