use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Trim};

use crate::import::error::ImportFeaturesError;

use super::entities::{FeatureImportRow, FeatureType};

pub const NAME_COLUMN: &str = "name";
pub const TYPE_COLUMN: &str = "type";
pub const VALUE_COLUMN: &str = "value";
pub const LABEL_COLUMN: &str = "label";
pub const DESCRIPTION_COLUMN: &str = "description";

const HEADER_ROW: usize = 1;

/// Positions of the known columns inside a record.
#[derive(Debug, Clone, Copy)]
struct Columns {
    name: usize,
    feature_type: usize,
    value: Option<usize>,
    label: Option<usize>,
    description: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self, ImportFeaturesError> {
        let find = |column: &str| {
            headers
                .iter()
                .position(|header| header.trim().eq_ignore_ascii_case(column))
        };
        let required = |column: &'static str| {
            find(column).ok_or(ImportFeaturesError::MissingColumn {
                row: HEADER_ROW,
                column,
            })
        };

        Ok(Self {
            name: required(NAME_COLUMN)?,
            feature_type: required(TYPE_COLUMN)?,
            value: find(VALUE_COLUMN),
            label: find(LABEL_COLUMN),
            description: find(DESCRIPTION_COLUMN),
        })
    }
}

/// Reads [FeatureImportRow] out of CSV text one record at a time. Rows are the lines a record
/// starts on, so the header is row 1 and blank lines still count.
pub struct FeatureCsvReader<'a> {
    records: StringRecordsIntoIter<&'a [u8]>,
    columns: Columns,
    /// Start of a quoted field that runs to the end of the input, with its line.
    unterminated_quote: Option<(u64, usize)>,
    row: usize,
}

impl<'a> FeatureCsvReader<'a> {
    pub fn new(content: &'a [u8]) -> Result<Self, ImportFeaturesError> {
        let unterminated_quote = unterminated_quote(content)
            .map(|offset| (offset as u64, line_of(content, offset)));

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(content);

        let headers = reader
            .headers()
            .map_err(|e| ImportFeaturesError::MalformedCsv {
                row: HEADER_ROW,
                reason: e.to_string(),
            })?
            .clone();
        if let Some((offset, row)) = unterminated_quote {
            if offset < reader.position().byte() {
                return Err(unterminated_quote_error(row));
            }
        }
        let columns = Columns::from_headers(&headers)?;

        Ok(Self {
            records: reader.into_records(),
            columns,
            unterminated_quote,
            row: HEADER_ROW,
        })
    }

    fn decode(&self, record: &StringRecord) -> Result<FeatureImportRow, ImportFeaturesError> {
        let row = self.row;
        let name = record
            .get(self.columns.name)
            .ok_or(ImportFeaturesError::MissingColumn {
                row,
                column: NAME_COLUMN,
            })?;
        let raw_type =
            record
                .get(self.columns.feature_type)
                .ok_or(ImportFeaturesError::MissingColumn {
                    row,
                    column: TYPE_COLUMN,
                })?;

        if name.trim().is_empty() {
            return Err(ImportFeaturesError::BlankName { row });
        }

        let feature_type =
            raw_type
                .parse::<FeatureType>()
                .map_err(|_| ImportFeaturesError::UnknownType {
                    row,
                    value: raw_type.to_string(),
                })?;

        let default_value = match optional_cell(record, self.columns.value) {
            Some(raw) => Some(feature_type.parse_value(raw).ok_or_else(|| {
                ImportFeaturesError::InvalidValue {
                    row,
                    value: raw.to_string(),
                    expected: feature_type,
                }
            })?),
            None => None,
        };

        Ok(FeatureImportRow {
            row,
            name: name.trim().into(),
            feature_type,
            default_value,
            default_label: optional_cell(record, self.columns.label).map(String::from),
            description: optional_cell(record, self.columns.description).map(String::from),
        })
    }
}

fn optional_cell(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl Iterator for FeatureCsvReader<'_> {
    type Item = Result<FeatureImportRow, ImportFeaturesError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(match record {
            Ok(record) => {
                self.row = record
                    .position()
                    .map_or(self.row + 1, |position| position.line() as usize);
                match self.unterminated_quote {
                    // The open quote swallowed everything up to the end of the input.
                    Some((offset, row))
                        if offset < self.records.reader().position().byte() =>
                    {
                        Err(unterminated_quote_error(row))
                    }
                    _ => self.decode(&record),
                }
            }
            Err(e) => {
                self.row = e
                    .position()
                    .map_or(self.row + 1, |position| position.line() as usize);
                Err(ImportFeaturesError::MalformedCsv {
                    row: self.row,
                    reason: e.to_string(),
                })
            }
        })
    }
}

fn unterminated_quote_error(row: usize) -> ImportFeaturesError {
    ImportFeaturesError::MalformedCsv {
        row,
        reason: "quoted field is never closed".into(),
    }
}

/// Byte offset of a quote that opens a field and is never closed. Follows the csv reader: a
/// quote only opens a field at its start and `""` inside a quoted field is an escaped quote.
fn unterminated_quote(content: &[u8]) -> Option<usize> {
    let mut open = None;
    let mut field_start = true;
    let mut bytes = content.iter().enumerate().peekable();
    while let Some((offset, byte)) = bytes.next() {
        match (open, byte) {
            (None, b'"') if field_start => {
                open = Some(offset);
                field_start = false;
            }
            (None, b',' | b'\n' | b'\r') => field_start = true,
            (None, _) => field_start = false,
            (Some(_), b'"') => {
                if bytes.next_if(|(_, next)| **next == b'"').is_none() {
                    open = None;
                }
            }
            (Some(_), _) => {}
        }
    }
    open
}

fn line_of(content: &[u8], offset: usize) -> usize {
    content[..offset].iter().filter(|v| **v == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::{
        features::entities::{FeatureImportRow, FeatureType, FeatureValue},
        import::error::ImportFeaturesError,
    };

    use super::FeatureCsvReader;

    fn read_all(csv: &str) -> Result<Vec<FeatureImportRow>, ImportFeaturesError> {
        FeatureCsvReader::new(csv.as_bytes())?.collect()
    }

    #[test]
    fn test_reads_continuous_feature() {
        let rows = read_all("name,type,value\nWeight,continuous,70.5\n").unwrap();
        assert_eq!(
            rows,
            vec![FeatureImportRow {
                row: 2,
                name: "Weight".into(),
                feature_type: FeatureType::Continuous,
                default_value: Some(FeatureValue::Continuous(70.5)),
                default_label: None,
                description: None,
            }]
        );
    }

    #[test]
    fn test_reads_optional_columns_in_any_order() {
        let csv = "Description, Label ,TYPE,Name,value\n\
                   \"Time asleep, roughly\",night,duration,Sleep,8:00:00\n\
                   ,,continuous,Mood,\n";
        let rows = read_all(csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(&*rows[0].name, "Sleep");
        assert_eq!(
            rows[0].default_value,
            Some(FeatureValue::Duration(Duration::hours(8)))
        );
        assert_eq!(rows[0].default_label.as_deref(), Some("night"));
        assert_eq!(rows[0].description.as_deref(), Some("Time asleep, roughly"));
        assert_eq!(rows[1].row, 3);
        assert_eq!(rows[1].default_value, None);
        assert_eq!(rows[1].default_label, None);
    }

    #[test]
    fn test_missing_header_column() {
        let Err(error) = FeatureCsvReader::new("name,value\nWeight,1\n".as_bytes()) else {
            panic!("header without a type column was accepted");
        };
        assert_eq!(
            error,
            ImportFeaturesError::MissingColumn {
                row: 1,
                column: "type"
            }
        );

        let Err(error) = FeatureCsvReader::new("".as_bytes()) else {
            panic!("empty file was accepted");
        };
        assert_eq!(
            error,
            ImportFeaturesError::MissingColumn {
                row: 1,
                column: "name"
            }
        );
    }

    #[test]
    fn test_short_row_misses_required_cell() {
        let error = read_all("name,value,type\nWeight,1,continuous\nMood,2\n").unwrap_err();
        assert_eq!(
            error,
            ImportFeaturesError::MissingColumn {
                row: 3,
                column: "type"
            }
        );
    }

    #[test]
    fn test_row_errors() {
        assert_eq!(
            read_all("name,type\n  ,continuous\n").unwrap_err(),
            ImportFeaturesError::BlankName { row: 2 }
        );
        assert_eq!(
            read_all("name,type\nMood,discrete\n").unwrap_err(),
            ImportFeaturesError::UnknownType {
                row: 2,
                value: "discrete".into()
            }
        );
        assert_eq!(
            read_all("name,type,value\nSleep,duration,eight\n").unwrap_err(),
            ImportFeaturesError::InvalidValue {
                row: 2,
                value: "eight".into(),
                expected: FeatureType::Duration,
            }
        );
    }

    #[test]
    fn test_reader_is_lazy() {
        let mut reader =
            FeatureCsvReader::new("name,type\nWeight,continuous\n,continuous\n".as_bytes())
                .unwrap();
        assert!(reader.next().unwrap().is_ok());
        assert_eq!(
            reader.next().unwrap(),
            Err(ImportFeaturesError::BlankName { row: 3 })
        );
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut content = b"name,type\n".to_vec();
        content.extend_from_slice(&[0xff, 0xfe, b',', b'x', b'\n']);
        let error = FeatureCsvReader::new(content.as_slice())
            .unwrap()
            .next()
            .unwrap()
            .unwrap_err();
        assert!(matches!(error, ImportFeaturesError::MalformedCsv { row: 2, .. }));
    }

    #[test]
    fn test_unclosed_quote_is_malformed() {
        let error = read_all(
            "name,type,description\nWeight,continuous,\"morning\nSleep,duration,night\n",
        )
        .unwrap_err();
        assert!(matches!(error, ImportFeaturesError::MalformedCsv { row: 2, .. }));

        let Err(error) = FeatureCsvReader::new("\"name,type\nWeight,continuous\n".as_bytes())
        else {
            panic!("header with an unclosed quote was accepted");
        };
        assert!(matches!(error, ImportFeaturesError::MalformedCsv { row: 1, .. }));
    }

    #[test]
    fn test_quoted_cells_may_span_lines() {
        let csv = "name,type,description\n\
                   Weight,continuous,\"morning\nafter \"\"coffee\"\"\"\n\
                   ,continuous,\n";
        let mut reader = FeatureCsvReader::new(csv.as_bytes()).unwrap();
        let row = reader.next().unwrap().unwrap();
        assert_eq!(row.description.as_deref(), Some("morning\nafter \"coffee\""));
        assert_eq!(
            reader.next().unwrap(),
            Err(ImportFeaturesError::BlankName { row: 4 })
        );
    }

    #[test]
    fn test_rows_are_file_lines() {
        assert_eq!(
            read_all("name,type\n\n\nWeight,continuous\n\n,continuous\n").unwrap_err(),
            ImportFeaturesError::BlankName { row: 6 }
        );
    }
}
