mod common;

use common::{listing, pipeline, scraped_places, settings, FakeProvider};
use reviewscope::config::Config;
use reviewscope::history::HistoryStore;
use reviewscope::model::SearchMode;
use reviewscope::pipeline::{RunContext, ScrapeOptions, SearchQuery, Selection};
use std::sync::Arc;
use tempfile::TempDir;

const OPTIONS: ScrapeOptions = ScrapeOptions {
    max_reviews: 20,
    ai_enabled: false,
};

fn store_in(dir: &TempDir) -> HistoryStore {
    let mut config = Config::default();
    config.storage.data_dir = dir.path().join("data");
    HistoryStore::from_config(&config).unwrap()
}

#[tokio::test]
async fn test_completed_run_round_trips_through_history() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir);
    assert!(temp_dir.path().join("data/history.sqlite").exists());

    let provider = Arc::new(FakeProvider::new(Vec::new(), scraped_places(2)));
    let pipeline = pipeline(provider, settings(5, 3));
    let mut ctx = RunContext::new();
    let lines = vec!["ChIJfirst".to_string(), "place_id:ChIJsecond".to_string()];
    let artifact = pipeline
        .run(&mut ctx, SearchQuery::Urls(lines), &Selection::All, OPTIONS)
        .await
        .unwrap();

    assert!(store.save(&artifact).unwrap());
    // Same mode and query moments later is not recorded twice
    assert!(!store.save(&artifact).unwrap());

    let runs = store.list().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, artifact.run_id);
    assert_eq!(runs[0].mode, SearchMode::Url);
    assert_eq!(runs[0].query, None);
    assert_eq!(runs[0].places_count, 2);
    assert_eq!(runs[0].reviews_count, 6);

    let restored = store.get(&artifact.run_id).unwrap().unwrap();
    assert_eq!(restored, artifact);

    assert!(store.delete(&artifact.run_id).unwrap());
    assert!(store.get(&artifact.run_id).unwrap().is_none());
}

#[tokio::test]
async fn test_different_queries_are_kept_apart() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir);

    for brand in ["Cafe", "Pizzeria"] {
        let provider = Arc::new(FakeProvider::new(
            vec![listing("P0", "Cafe 0 - Milano")],
            scraped_places(1),
        ));
        let pipeline = pipeline(provider, settings(5, 3));
        let mut ctx = RunContext::new();
        let query = SearchQuery::Brand(reviewscope::jobs::DiscoveryRequest {
            query: brand.to_string(),
            location_hint: String::new(),
            max_results: 5,
            mode: Default::default(),
            skip_closed: false,
        });
        let artifact = pipeline
            .run(&mut ctx, query, &Selection::All, OPTIONS)
            .await
            .unwrap();
        assert!(store.save(&artifact).unwrap());
    }

    let queries: Vec<Option<String>> = store.list().unwrap().into_iter().map(|r| r.query).collect();
    assert_eq!(queries.len(), 2);
    assert!(queries.contains(&Some("Cafe".to_string())));
    assert!(queries.contains(&Some("Pizzeria".to_string())));

    assert_eq!(store.clear().unwrap(), 2);
    assert!(store.list().unwrap().is_empty());
}
