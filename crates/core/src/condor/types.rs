use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::CondorError;

/// Grid types understood by Condor-G's `grid_resource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridType {
    Gt2,
    Gt4,
    Gt5,
    Condor,
    Nordugrid,
    Unicore,
    Lsf,
    Pbs,
}

impl GridType {
    /// The type string as it appears in a submit description.
    pub fn as_str(&self) -> &'static str {
        match self {
            GridType::Gt2 => "gt2",
            GridType::Gt4 => "gt4",
            GridType::Gt5 => "gt5",
            GridType::Condor => "condor",
            GridType::Nordugrid => "nordugrid",
            GridType::Unicore => "unicore",
            GridType::Lsf => "lsf",
            GridType::Pbs => "pbs",
        }
    }

    /// Whether job overrides for this gateway are written as RSL.
    pub fn uses_rsl(&self) -> bool {
        matches!(self, GridType::Gt2 | GridType::Gt5)
    }

    /// Whether job overrides for this gateway are written as XML.
    pub fn uses_xml(&self) -> bool {
        matches!(self, GridType::Gt4)
    }
}

impl fmt::Display for GridType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GridType {
    type Err = CondorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gt2" => Ok(GridType::Gt2),
            "gt4" => Ok(GridType::Gt4),
            "gt5" => Ok(GridType::Gt5),
            "condor" => Ok(GridType::Condor),
            "nordugrid" => Ok(GridType::Nordugrid),
            "unicore" => Ok(GridType::Unicore),
            "lsf" => Ok(GridType::Lsf),
            "pbs" => Ok(GridType::Pbs),
            other => Err(CondorError::UnknownGridType(other.to_string())),
        }
    }
}

/// A single `NAME=value` pair passed to a remote job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

impl EnvironmentVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Gateway-specific job attributes appended to the submit description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOverride {
    /// Written as `globus_rsl`.
    Rsl(String),
    /// Written as `globus_xml`.
    Xml(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_type_round_trip_strings() {
        for gt in [
            GridType::Gt2,
            GridType::Gt4,
            GridType::Gt5,
            GridType::Condor,
            GridType::Nordugrid,
            GridType::Unicore,
            GridType::Lsf,
            GridType::Pbs,
        ] {
            assert_eq!(gt.as_str().parse::<GridType>().unwrap(), gt);
        }
    }

    #[test]
    fn test_grid_type_unknown() {
        let err = "gt3".parse::<GridType>().unwrap_err();
        assert!(matches!(err, CondorError::UnknownGridType(ref s) if s == "gt3"));
    }

    #[test]
    fn test_override_dialects() {
        assert!(GridType::Gt2.uses_rsl());
        assert!(GridType::Gt5.uses_rsl());
        assert!(GridType::Gt4.uses_xml());
        assert!(!GridType::Pbs.uses_rsl());
        assert!(!GridType::Pbs.uses_xml());
    }

    #[test]
    fn test_grid_type_serde() {
        let json = serde_json::to_string(&GridType::Nordugrid).unwrap();
        assert_eq!(json, "\"nordugrid\"");
    }
}
