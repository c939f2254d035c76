//! Prints the document collections, their link fields and derived back-links as JSON.

use anyhow::Context;
use job_provisioner::schema::catalog;

fn main() -> anyhow::Result<()> {
    let catalog = catalog();
    let json = serde_json::to_string_pretty(&catalog).context("rendering schema catalog")?;
    println!("{}", json);
    Ok(())
}
