//! Synthetic player statistics for sample runs

use afl_common::{Result, Scalar, YearRecord};
use async_trait::async_trait;
use tracing::info;

use super::StatsFetcher;

const FIRST_NAMES: [&str; 10] = [
    "John", "Michael", "David", "James", "Robert", "William", "Richard", "Joseph", "Thomas",
    "Charles",
];
const SURNAMES: [&str; 10] = [
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Miller", "Davis", "Garcia", "Rodriguez",
    "Wilson",
];
const JUMPERS: [i64; 10] = [7, 9, 11, 13, 15, 17, 19, 21, 23, 25];
const KICKS: [i64; 10] = [15, 12, 18, 10, 20, 14, 16, 13, 19, 17];
const MARKS: [i64; 10] = [6, 5, 8, 4, 9, 7, 8, 6, 10, 9];
const HANDBALLS: [i64; 10] = [10, 8, 12, 6, 15, 11, 14, 9, 16, 13];
const GOALS: [i64; 10] = [2, 1, 3, 0, 4, 2, 2, 1, 3, 2];
const BEHINDS: [i64; 10] = [1, 2, 0, 1, 1, 0, 1, 0, 2, 1];
const HIT_OUTS: [i64; 10] = [0, 0, 20, 0, 0, 0, 0, 25, 0, 0];
const TACKLES: [i64; 10] = [5, 4, 7, 3, 8, 6, 7, 5, 9, 8];

const COLUMNS: [&str; 20] = [
    "Season",
    "Round",
    "Local.start.time",
    "Venue",
    "Attendance",
    "First.name",
    "Surname",
    "ID",
    "Jumper.No.",
    "Playing.for",
    "Kicks",
    "Marks",
    "Handballs",
    "Goals",
    "Behinds",
    "Hit.Outs",
    "Tackles",
    "Home.team",
    "Away.team",
    "year",
];

/// Ten Richmond v Carlton player lines for round 1 of `year`
pub fn create_sample_data(year: i32) -> YearRecord {
    info!(year, "Creating sample data");

    let year = i64::from(year);
    let rows = (0..FIRST_NAMES.len())
        .map(|i| {
            let team = if i < 5 { "Richmond" } else { "Carlton" };
            vec![
                Scalar::Int(year),
                Scalar::from("Round 1"),
                Scalar::Int(1920),
                Scalar::from("M.C.G."),
                Scalar::Int(88084),
                Scalar::from(FIRST_NAMES[i]),
                Scalar::from(SURNAMES[i]),
                Scalar::Int(1001 + i as i64),
                Scalar::Int(JUMPERS[i]),
                Scalar::from(team),
                Scalar::Int(KICKS[i]),
                Scalar::Int(MARKS[i]),
                Scalar::Int(HANDBALLS[i]),
                Scalar::Int(GOALS[i]),
                Scalar::Int(BEHINDS[i]),
                Scalar::Int(HIT_OUTS[i]),
                Scalar::Int(TACKLES[i]),
                Scalar::from("Richmond"),
                Scalar::from("Carlton"),
                Scalar::Int(year),
            ]
        })
        .collect::<Vec<_>>();

    let mut record = YearRecord::new(COLUMNS.iter().map(|c| c.to_string()).collect());
    for row in rows {
        // Every row is built against COLUMNS, so the width always matches
        if record.push_row(row).is_err() {
            break;
        }
    }

    info!(rows = record.row_count(), "Created sample dataframe");
    record
}

/// Adapter that serves [`create_sample_data`] for any year and source
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleStatsFetcher;

#[async_trait]
impl StatsFetcher for SampleStatsFetcher {
    fn name(&self) -> &str {
        "sample"
    }

    async fn fetch_stats(&self, year: i32, _source: &str) -> Result<YearRecord> {
        Ok(create_sample_data(year))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_shape() {
        let record = create_sample_data(2019);
        assert_eq!(record.row_count(), 10);
        assert_eq!(record.column_count(), COLUMNS.len());
        assert!(record.validate().is_ok());
        assert!(record
            .column_values("year")
            .unwrap()
            .iter()
            .all(|v| **v == Scalar::Int(2019)));
        assert_eq!(
            record.column_values("Playing.for").unwrap()[7],
            &Scalar::from("Carlton")
        );
    }

    #[tokio::test]
    async fn test_sample_fetcher_ignores_source() {
        let record = SampleStatsFetcher
            .fetch_stats(2020, "anything")
            .await
            .unwrap();
        assert_eq!(record.column_values("Season").unwrap()[0], &Scalar::Int(2020));
    }
}
