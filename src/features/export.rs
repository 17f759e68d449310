use std::io::Write;

use anyhow::Result;

use super::{
    entities::FeatureEntity,
    parser::{DESCRIPTION_COLUMN, LABEL_COLUMN, NAME_COLUMN, TYPE_COLUMN, VALUE_COLUMN},
};

/// Writes features as CSV in the layout [FeatureCsvReader](super::parser::FeatureCsvReader)
/// reads, ordered by display index.
pub fn write_features_csv(features: &[FeatureEntity], writer: impl Write) -> Result<()> {
    let mut features = features.iter().collect::<Vec<_>>();
    features.sort_by_key(|v| v.display_index);

    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record([
        NAME_COLUMN,
        TYPE_COLUMN,
        VALUE_COLUMN,
        LABEL_COLUMN,
        DESCRIPTION_COLUMN,
    ])?;

    for feature in features {
        let feature_type = feature.feature_type.to_string();
        let value = feature
            .default_value
            .map(|v| v.to_string())
            .unwrap_or_default();
        writer.write_record([
            &*feature.name,
            feature_type.as_str(),
            value.as_str(),
            feature.default_label.as_deref().unwrap_or_default(),
            feature.description.as_deref().unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
