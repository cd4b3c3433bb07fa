//! Source feed adapter tests against a mock server

use afl_common::{AflError, Scalar};
use afl_pipeline::fetch::{HttpStatsFetcher, StatsFetcher};
use std::time::Duration;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const SEASON_CSV: &str = "\
Season,Round,Date,Local.start.time,Venue,Attendance,First.name,Surname,ID,Jumper.No.,Playing.for,Kicks
2019,1,2019-03-21,1925,M.C.G.,85016,Dustin,Martin,12217,4,Richmond,18
2019,1,2019-03-21,1925,M.C.G.,85016,Patrick,Cripps,12505,9,Carlton,21
";

fn fetcher(server: &MockServer) -> HttpStatsFetcher {
    HttpStatsFetcher::new(
        format!("{}/{{source}}/player_stats_{{year}}.csv", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_fetch_parses_csv() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/afltables/player_stats_2019.csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/csv")
                .set_body_string(SEASON_CSV),
        )
        .expect(1)
        .mount(&server)
        .await;

    let record = fetcher(&server).fetch_stats(2019, "afltables").await.unwrap();

    assert_eq!(record.row_count(), 2);
    assert_eq!(record.column_count(), 12);
    assert_eq!(
        record.column_values("Surname").unwrap(),
        vec![&Scalar::from("Martin"), &Scalar::from("Cripps")]
    );
    assert_eq!(record.column_values("ID").unwrap()[0], &Scalar::Int(12217));
}

#[tokio::test]
async fn test_missing_season_is_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = fetcher(&server).fetch_stats(1890, "afltables").await;

    match result {
        Err(AflError::Fetch(message)) => assert!(message.contains("404")),
        other => panic!("expected fetch error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ragged_payload_is_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/afltables/player_stats_2019.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Season,Round\n2019\n"))
        .mount(&server)
        .await;

    let result = fetcher(&server).fetch_stats(2019, "afltables").await;

    assert!(matches!(result, Err(AflError::Fetch(_))));
}
