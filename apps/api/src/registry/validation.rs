//! Boundary validation: natural keys, strict semver, roles, tags, scalars.
//!
//! Everything here is pure and synchronous. Handlers call these before any
//! store write so that malformed input never reaches the database.

use crate::errors::AppError;

/// Maximum length of a template_id / bundle_id natural key.
pub const MAX_NATURAL_ID_LEN: usize = 255;
/// Maximum length of a semver string.
pub const MAX_SEMVER_LEN: usize = 64;
/// Tags longer than this are dropped during normalization.
pub const MAX_TAG_LEN: usize = 64;
/// Maximum length of a render task string.
pub const MAX_TASK_LEN: usize = 4096;

/// Template role. Stored as its snake_case string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateRole {
    System,
    Developer,
    User,
}

impl TemplateRole {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "system" => Ok(TemplateRole::System),
            "developer" => Ok(TemplateRole::Developer),
            "user" => Ok(TemplateRole::User),
            other => Err(AppError::Validation(format!(
                "role must be one of system, developer, user; got '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateRole::System => "system",
            TemplateRole::Developer => "developer",
            TemplateRole::User => "user",
        }
    }
}

/// Validates a template_id / bundle_id natural key: non-empty, bounded.
pub fn validate_natural_id(field: &str, value: &str) -> Result<(), AppError> {
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    if value.len() > MAX_NATURAL_ID_LEN {
        return Err(AppError::Validation(format!(
            "{field} must be at most {MAX_NATURAL_ID_LEN} characters"
        )));
    }
    Ok(())
}

/// Strict semver: `major.minor.patch` with an optional `-prerelease` suffix.
/// Rejects leading `v`, missing components, and non-digit components.
pub fn validate_semver(semver: &str) -> Result<(), AppError> {
    if semver.is_empty() || semver.len() > MAX_SEMVER_LEN {
        return Err(AppError::Validation(format!(
            "semver must be 1..={MAX_SEMVER_LEN} characters"
        )));
    }
    let (core, prerelease) = match semver.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (semver, None),
    };

    let components: Vec<&str> = core.split('.').collect();
    let core_ok = components.len() == 3
        && components
            .iter()
            .all(|c| !c.is_empty() && c.bytes().all(|b| b.is_ascii_digit()));
    if !core_ok {
        return Err(AppError::Validation(format!(
            "semver must match major.minor.patch[-prerelease]; got '{semver}'"
        )));
    }

    if let Some(pre) = prerelease {
        let pre_ok = !pre.is_empty()
            && pre
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-');
        if !pre_ok {
            return Err(AppError::Validation(format!(
                "semver prerelease must be alphanumeric with '.' or '-'; got '{semver}'"
            )));
        }
    }
    Ok(())
}

/// Normalizes a tag list: trim, drop empties, drop over-length entries,
/// collapse duplicates preserving first-occurrence order. `None` → empty.
pub fn normalize_tags(tags: Option<&[String]>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags.unwrap_or_default() {
        let trimmed = tag.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_TAG_LEN {
            continue;
        }
        if !out.iter().any(|t| t == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    out
}

/// Requires a scalar to lie in [0.0, 1.0]. Out-of-range is a validation
/// failure, not a silent clamp — the value feeds the personality hash.
pub fn validate_unit_interval(field: &str, value: f64) -> Result<(), AppError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{field} must be in [0.0, 1.0]; got {value}"
        )))
    }
}

/// Bounds the free-text task input.
pub fn validate_task(task: &str) -> Result<(), AppError> {
    if task.len() > MAX_TASK_LEN {
        return Err(AppError::Validation(format!(
            "task must be at most {MAX_TASK_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semver_accepts_strict_forms() {
        assert!(validate_semver("1.0.0").is_ok());
        assert!(validate_semver("0.1.0").is_ok());
        assert!(validate_semver("2.1.0-alpha").is_ok());
        assert!(validate_semver("10.20.30-rc.1").is_ok());
    }

    #[test]
    fn test_semver_rejects_loose_forms() {
        assert!(validate_semver("invalid").is_err());
        assert!(validate_semver("1.0").is_err());
        assert!(validate_semver("v1.0.0").is_err());
        assert!(validate_semver("1.0.0-").is_err());
        assert!(validate_semver("1..0").is_err());
        assert!(validate_semver("").is_err());
        assert!(validate_semver(&"1".repeat(65)).is_err());
    }

    #[test]
    fn test_tags_normalization() {
        assert_eq!(normalize_tags(None), Vec::<String>::new());
        assert_eq!(normalize_tags(Some(&[])), Vec::<String>::new());
        let tags = vec![
            "gpt-4o".to_string(),
            "  gpt-4o  ".to_string(),
            "default".to_string(),
        ];
        assert_eq!(normalize_tags(Some(&tags)), vec!["gpt-4o", "default"]);
        let tags = vec!["a".to_string(), "  ".to_string(), String::new()];
        assert_eq!(normalize_tags(Some(&tags)), vec!["a"]);
        let tags = vec!["ok".to_string(), "x".repeat(65)];
        assert_eq!(normalize_tags(Some(&tags)), vec!["ok"]);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(TemplateRole::parse("system").unwrap().as_str(), "system");
        assert_eq!(
            TemplateRole::parse("developer").unwrap().as_str(),
            "developer"
        );
        assert_eq!(TemplateRole::parse("user").unwrap().as_str(), "user");
        assert!(TemplateRole::parse("assistant").is_err());
    }

    #[test]
    fn test_unit_interval_bounds() {
        assert!(validate_unit_interval("stress", 0.0).is_ok());
        assert!(validate_unit_interval("stress", 1.0).is_ok());
        assert!(validate_unit_interval("stress", -0.01).is_err());
        assert!(validate_unit_interval("stress", 1.01).is_err());
        assert!(validate_unit_interval("stress", f64::NAN).is_err());
    }

    #[test]
    fn test_natural_id_bounds() {
        assert!(validate_natural_id("template_id", "t").is_ok());
        assert!(validate_natural_id("template_id", "").is_err());
        assert!(validate_natural_id("template_id", &"x".repeat(256)).is_err());
    }
}
