use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, instrument};

use crate::{
    import::error::ImportFeaturesError,
    storage::feature_store::{FeatureStore, FeatureTransaction},
};

use super::{entities::GroupId, parser::FeatureCsvReader};

/// Outcome of a successful import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub group_id: GroupId,
    pub imported: usize,
}

/// Reads CSV text from `source` and creates the described features in `group_id`.
///
/// Either every row is committed or none is: rows are staged in a single store transaction and
/// the first invalid row drops it.
#[instrument(skip(store, source))]
pub async fn import_features<S: FeatureStore>(
    store: &S,
    mut source: impl AsyncRead + Unpin,
    group_id: GroupId,
) -> Result<ImportSummary, ImportFeaturesError> {
    let mut content = Vec::new();
    source
        .read_to_end(&mut content)
        .await
        .map_err(|e| ImportFeaturesError::SourceUnavailable {
            reason: e.to_string(),
        })?;
    debug!("Read {} bytes", content.len());

    let mut transaction = store
        .begin(group_id)
        .await
        .map_err(ImportFeaturesError::storage)?;

    let imported = stage_rows(&mut transaction, content.as_slice())?;

    transaction
        .commit()
        .await
        .map_err(ImportFeaturesError::storage)?;

    info!("Imported {imported} features into group {group_id}");
    Ok(ImportSummary { group_id, imported })
}

/// Validates rows in order and stages them. Stops at the first invalid row.
fn stage_rows(
    transaction: &mut impl FeatureTransaction,
    content: &[u8],
) -> Result<usize, ImportFeaturesError> {
    let mut imported = 0;
    for row in FeatureCsvReader::new(content)? {
        let row = row?;
        if transaction.contains_name(&row.name) {
            return Err(ImportFeaturesError::DuplicateName {
                row: row.row,
                name: row.name.to_string(),
            });
        }
        transaction
            .insert(row.into())
            .map_err(ImportFeaturesError::storage)?;
        imported += 1;
    }
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use crate::{
        features::{
            entities::{FeatureType, FeatureValue},
            export::write_features_csv,
        },
        import::error::ImportFeaturesError,
        storage::feature_store::{FeatureStore, FileFeatureStore},
        utils::logging::TEST_LOGGING,
    };

    use super::{import_features, ImportSummary};

    const FEATURES: &str = "name,type,value,label,description\n\
                            Weight,continuous,70.5,kg,Morning weight\n\
                            Sleep,duration,7:30:00,,\n\
                            Mood,continuous,,,\n";

    #[tokio::test]
    async fn test_import_commits_every_row() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let store = FileFeatureStore::new(dir.path().to_owned())?;

        let summary = import_features(&store, FEATURES.as_bytes(), 9).await?;
        assert_eq!(
            summary,
            ImportSummary {
                group_id: 9,
                imported: 3
            }
        );

        let features = store.features_in(9).await?;
        let names = features.iter().map(|v| &*v.name).collect::<Vec<_>>();
        assert_eq!(names, vec!["Weight", "Sleep", "Mood"]);
        assert_eq!(features[0].default_value, Some(FeatureValue::Continuous(70.5)));
        assert_eq!(features[0].default_label.as_deref(), Some("kg"));
        assert_eq!(features[1].feature_type, FeatureType::Duration);
        assert_eq!(features[2].default_value, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_import_rejects_whole_file_on_late_error() -> Result<()> {
        let dir = tempdir()?;
        let store = FileFeatureStore::new(dir.path().to_owned())?;

        let csv = "name,type,value\nWeight,continuous,70\nSleep,continuous,lots\n";
        let error = import_features(&store, csv.as_bytes(), 1)
            .await
            .unwrap_err();
        assert_eq!(
            error,
            ImportFeaturesError::InvalidValue {
                row: 3,
                value: "lots".into(),
                expected: FeatureType::Continuous,
            }
        );
        assert!(store.features_in(1).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_import_rejects_unclosed_quote() -> Result<()> {
        let dir = tempdir()?;
        let store = FileFeatureStore::new(dir.path().to_owned())?;

        let csv = "name,type,description\nWeight,continuous,\"morning\nSleep,duration,night\n";
        let error = import_features(&store, csv.as_bytes(), 1)
            .await
            .unwrap_err();
        assert!(matches!(error, ImportFeaturesError::MalformedCsv { row: 2, .. }));
        assert!(store.features_in(1).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_import_rejects_duplicates_within_file() -> Result<()> {
        let dir = tempdir()?;
        let store = FileFeatureStore::new(dir.path().to_owned())?;

        let csv = "name,type\nWeight,continuous\nMood,continuous\nWeight,duration\n";
        let error = import_features(&store, csv.as_bytes(), 1)
            .await
            .unwrap_err();
        assert_eq!(
            error,
            ImportFeaturesError::DuplicateName {
                row: 4,
                name: "Weight".into()
            }
        );
        assert!(store.features_in(1).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_import_only_checks_names_of_target_group() -> Result<()> {
        let dir = tempdir()?;
        let store = FileFeatureStore::new(dir.path().to_owned())?;

        import_features(&store, "name,type\nWeight,continuous\n".as_bytes(), 1).await?;
        import_features(&store, "name,type\nWeight,continuous\n".as_bytes(), 2).await?;

        assert_eq!(store.features_in(1).await?.len(), 1);
        assert_eq!(store.features_in(2).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_reimporting_an_export_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let store = FileFeatureStore::new(dir.path().to_owned())?;
        import_features(&store, FEATURES.as_bytes(), 3).await?;

        let mut exported = Vec::new();
        write_features_csv(&store.features_in(3).await?, &mut exported)?;

        let error = import_features(&store, exported.as_slice(), 3)
            .await
            .unwrap_err();
        assert_eq!(
            error,
            ImportFeaturesError::DuplicateName {
                row: 2,
                name: "Weight".into()
            }
        );
        assert_eq!(store.features_in(3).await?.len(), 3);

        // The same export is a valid import for another group.
        let summary = import_features(&store, exported.as_slice(), 4).await?;
        assert_eq!(summary.imported, 3);
        let copied = store.features_in(4).await?;
        let original = store.features_in(3).await?;
        for (copy, original) in copied.iter().zip(original.iter()) {
            assert_eq!(copy.name, original.name);
            assert_eq!(copy.feature_type, original.feature_type);
            assert_eq!(copy.default_value, original.default_value);
            assert_eq!(copy.default_label, original.default_label);
            assert_eq!(copy.description, original.description);
        }
        Ok(())
    }
}
