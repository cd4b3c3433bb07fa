//! CSV encoding of year records.
//!
//! Staged objects are UTF-8, comma separated, header first, with no index column.

use afl_common::{AflError, Result, Scalar, YearRecord};

/// Content type attached to staged objects
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Field delimiter shared by the encoder and the warehouse load configuration
pub const CSV_DELIMITER: u8 = b',';

/// Serialize a record as delimited text
pub fn encode_csv(record: &YearRecord) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(CSV_DELIMITER)
        .from_writer(Vec::new());

    writer.write_record(record.columns()).map_err(csv_error)?;
    for row in record.rows() {
        writer
            .write_record(row.iter().map(|cell| cell.to_string()))
            .map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| AflError::parse(format!("Failed to flush CSV buffer: {}", e)))
}

/// Parse delimited text with a header row, inferring each cell's scalar type.
///
/// Not an exact inverse of [`encode_csv`]: an empty string comes back as
/// `Null` and a numeric-looking string such as `"007"` comes back as
/// `Int(7)`. Callers must not rely on cell types surviving staging.
pub fn decode_csv(data: &[u8]) -> Result<YearRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(CSV_DELIMITER)
        .has_headers(true)
        .from_reader(data);

    let columns: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut record = YearRecord::new(columns);
    for row in reader.records() {
        let row = row.map_err(csv_error)?;
        record.push_row(row.iter().map(Scalar::infer).collect())?;
    }

    record.validate()?;
    Ok(record)
}

fn csv_error(err: csv::Error) -> AflError {
    AflError::parse(format!("CSV error: {}", err))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_writes_header_and_quotes() {
        let record = YearRecord::from_rows(
            vec!["Venue".into(), "Attendance".into(), "Round".into()],
            vec![vec![
                Scalar::from("M.C.G."),
                Scalar::Float(88084.0),
                Scalar::from("Round 1, Day 2"),
            ]],
        )
        .unwrap();

        let text = String::from_utf8(encode_csv(&record).unwrap()).unwrap();
        assert_eq!(
            text,
            "Venue,Attendance,Round\nM.C.G.,88084.0,\"Round 1, Day 2\"\n"
        );
    }

    #[test]
    fn test_decode_infers_types_and_nulls() {
        let data = b"Season,Venue,Attendance,Jumper.No.\n2023,Gabba,,7\n2023,M.C.G.,88084.5,9\n";
        let record = decode_csv(data).unwrap();

        assert_eq!(record.row_count(), 2);
        assert_eq!(record.rows()[0][0], Scalar::Int(2023));
        assert_eq!(record.rows()[0][2], Scalar::Null);
        assert_eq!(record.rows()[1][2], Scalar::Float(88084.5));
        assert_eq!(record.rows()[1][1], Scalar::from("M.C.G."));
    }

    #[test]
    fn test_staging_does_not_preserve_string_cells() {
        let record = YearRecord::from_rows(
            vec!["Jumper.No.".into(), "Sub".into()],
            vec![vec![Scalar::from("007"), Scalar::from("")]],
        )
        .unwrap();

        let staged = decode_csv(&encode_csv(&record).unwrap()).unwrap();
        assert_eq!(staged.rows()[0], vec![Scalar::Int(7), Scalar::Null]);
    }

    #[test]
    fn test_decode_rejects_ragged_rows() {
        let data = b"a,b\n1,2\n3\n";
        assert!(decode_csv(data).is_err());
    }

    #[test]
    fn test_header_only_is_empty_record() {
        let record = decode_csv(b"a,b\n").unwrap();
        assert_eq!(record.column_count(), 2);
        assert!(record.is_empty());
    }
}
