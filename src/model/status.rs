use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Row status used across the schema. Source files spell it any way they
/// like; parsing is case-insensitive and anything that is not "inactive"
/// counts as Active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Status {
    Active,
    Inactive,
}

impl Status {
    pub fn from_source(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("inactive") => Status::Inactive,
            _ => Status::Active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_defaults_to_active() {
        assert_eq!(Status::from_source(None), Status::Active);
        assert_eq!(Status::from_source(Some("Working")), Status::Active);
    }

    #[test]
    fn inactive_marker_any_case() {
        assert_eq!(Status::from_source(Some("INACTIVE")), Status::Inactive);
        assert_eq!(Status::from_source(Some(" inactive ")), Status::Inactive);
    }

    #[test]
    fn renders_db_spelling() {
        assert_eq!(Status::Active.to_string(), "Active");
        assert_eq!(Status::Inactive.to_string(), "Inactive");
    }
}
