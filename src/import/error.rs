use thiserror::Error;

use crate::features::entities::FeatureType;

/// The single failure channel of a feature import. Callers display it through
/// [ImportFeaturesError::message_id] and [ImportFeaturesError::format_args]; [Display] is meant
/// for logs and the command line.
///
/// [Display]: std::fmt::Display
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportFeaturesError {
    #[error("Could not open the selected file: {reason}")]
    SourceUnavailable { reason: String },

    #[error("Row {row}: the file is not valid CSV ({reason})")]
    MalformedCsv { row: usize, reason: String },

    #[error("Row {row}: required column \"{column}\" is missing")]
    MissingColumn { row: usize, column: &'static str },

    #[error("Row {row}: feature name can not be blank")]
    BlankName { row: usize },

    #[error("Row {row}: a feature named \"{name}\" already exists in this group")]
    DuplicateName { row: usize, name: String },

    #[error("Row {row}: \"{value}\" is not a known feature type")]
    UnknownType { row: usize, value: String },

    #[error("Row {row}: \"{value}\" is not a valid {expected} value")]
    InvalidValue {
        row: usize,
        value: String,
        expected: FeatureType,
    },

    #[error("Could not save the imported features: {reason}")]
    Storage { reason: String },
}

impl ImportFeaturesError {
    /// Stable identifier of the message template to show.
    pub fn message_id(&self) -> &'static str {
        match self {
            ImportFeaturesError::SourceUnavailable { .. } => "import_error_source_unavailable",
            ImportFeaturesError::MalformedCsv { .. } => "import_error_malformed_csv",
            ImportFeaturesError::MissingColumn { .. } => "import_error_missing_column",
            ImportFeaturesError::BlankName { .. } => "import_error_blank_name",
            ImportFeaturesError::DuplicateName { .. } => "import_error_duplicate_name",
            ImportFeaturesError::UnknownType { .. } => "import_error_unknown_type",
            ImportFeaturesError::InvalidValue { .. } => "import_error_invalid_value",
            ImportFeaturesError::Storage { .. } => "import_error_storage",
        }
    }

    /// Arguments substituted into the template named by [ImportFeaturesError::message_id], in
    /// order. Row numbers always come first.
    pub fn format_args(&self) -> Vec<String> {
        match self {
            ImportFeaturesError::SourceUnavailable { reason }
            | ImportFeaturesError::Storage { reason } => vec![reason.clone()],
            ImportFeaturesError::MalformedCsv { row, reason } => {
                vec![row.to_string(), reason.clone()]
            }
            ImportFeaturesError::MissingColumn { row, column } => {
                vec![row.to_string(), column.to_string()]
            }
            ImportFeaturesError::BlankName { row } => vec![row.to_string()],
            ImportFeaturesError::DuplicateName { row, name } => vec![row.to_string(), name.clone()],
            ImportFeaturesError::UnknownType { row, value } => {
                vec![row.to_string(), value.clone()]
            }
            ImportFeaturesError::InvalidValue {
                row,
                value,
                expected,
            } => vec![row.to_string(), value.clone(), expected.to_string()],
        }
    }

    /// Row the failure refers to, if it was caused by the file contents.
    pub fn row(&self) -> Option<usize> {
        match self {
            ImportFeaturesError::MalformedCsv { row, .. }
            | ImportFeaturesError::MissingColumn { row, .. }
            | ImportFeaturesError::BlankName { row }
            | ImportFeaturesError::DuplicateName { row, .. }
            | ImportFeaturesError::UnknownType { row, .. }
            | ImportFeaturesError::InvalidValue { row, .. } => Some(*row),
            ImportFeaturesError::SourceUnavailable { .. }
            | ImportFeaturesError::Storage { .. } => None,
        }
    }

    pub(crate) fn storage(error: anyhow::Error) -> Self {
        ImportFeaturesError::Storage {
            reason: format!("{error:#}"),
        }
    }
}
