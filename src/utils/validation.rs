use crate::utils::error::{ProvisionError, Result};
use regex::Regex;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn matches(pattern: &str, value: &str) -> bool {
    Regex::new(pattern)
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

fn invalid(field_name: &str, value: &str, reason: impl Into<String>) -> ProvisionError {
    ProvisionError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// A required string counts as missing when it is absent or blank.
pub fn validate_required_string<'a>(field_name: &str, value: &'a Option<String>) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ProvisionError::MissingConfigError {
            field: field_name.to_string(),
        }),
    }
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(field_name, value, "Value cannot be empty or whitespace-only"));
    }
    Ok(())
}

pub fn validate_project_id(field_name: &str, value: &str) -> Result<()> {
    if !matches(r"^[a-z][-a-z0-9]{4,28}[a-z0-9]$", value) {
        return Err(invalid(
            field_name,
            value,
            "Project ids are 6-30 lowercase letters, digits or hyphens and start with a letter",
        ));
    }
    Ok(())
}

/// Cloud Run jobs, Artifact Registry repositories and Scheduler jobs share this shape.
pub fn validate_resource_name(field_name: &str, value: &str) -> Result<()> {
    if !matches(r"^[a-z]([-a-z0-9]{0,61}[a-z0-9])?$", value) {
        return Err(invalid(
            field_name,
            value,
            "Use lowercase letters, digits and hyphens, starting with a letter (max 63 chars)",
        ));
    }
    Ok(())
}

pub fn validate_secret_name(field_name: &str, value: &str) -> Result<()> {
    if !matches(r"^[A-Za-z0-9_-]{1,255}$", value) {
        return Err(invalid(
            field_name,
            value,
            "Secret names may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

pub fn validate_bucket_name(field_name: &str, value: &str) -> Result<()> {
    if !matches(r"^[a-z0-9][a-z0-9._-]{1,61}[a-z0-9]$", value) {
        return Err(invalid(
            field_name,
            value,
            "Bucket names are 3-63 lowercase letters, digits, '-', '_' or '.'",
        ));
    }
    Ok(())
}

pub fn validate_env_key(field_name: &str, value: &str) -> Result<()> {
    if !matches(r"^[A-Za-z_][A-Za-z0-9_]*$", value) {
        return Err(invalid(field_name, value, "Not a valid environment variable name"));
    }
    Ok(())
}

pub fn validate_absolute_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }
    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }
    if !path.starts_with('/') {
        return Err(invalid(field_name, path, "Path must be absolute (start with '/')"));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(invalid(field_name, path, "Path must not contain '..' segments"));
    }
    Ok(())
}

/// Paths resolved under a mount point.
pub fn validate_relative_path(field_name: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }
    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }
    if path.starts_with('/') {
        return Err(invalid(field_name, path, "Path must be relative to the mount path"));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(invalid(field_name, path, "Path must not contain '..' segments"));
    }
    Ok(())
}

pub fn validate_cpu(field_name: &str, value: &str) -> Result<()> {
    if !matches(r"^([0-9]+(\.[0-9]+)?|[0-9]+m)$", value) {
        return Err(invalid(field_name, value, "Expected a CPU count such as '1', '0.5' or '500m'"));
    }
    Ok(())
}

pub fn validate_memory(field_name: &str, value: &str) -> Result<()> {
    if !matches(r"^[0-9]+(Ki|Mi|Gi|Ti|K|M|G|T)?$", value) {
        return Err(invalid(field_name, value, "Expected a memory quantity such as '512Mi' or '2Gi'"));
    }
    Ok(())
}

pub fn validate_duration(field_name: &str, value: &str) -> Result<()> {
    if !matches(r"^[0-9]+[smh]$", value) {
        return Err(invalid(field_name, value, "Expected a duration such as '600s', '30m' or '1h'"));
    }
    Ok(())
}

/// Five-field unix cron, as accepted by Cloud Scheduler.
pub fn validate_cron(field_name: &str, value: &str) -> Result<()> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(invalid(
            field_name,
            value,
            format!("Expected 5 cron fields, found {}", fields.len()),
        ));
    }
    if let Some(bad) = fields.iter().find(|f| !matches(r"^[0-9A-Za-z*/,\-]+$", f)) {
        return Err(invalid(field_name, value, format!("Invalid cron field '{}'", bad)));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            &value.to_string(),
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}
