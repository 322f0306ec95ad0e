use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use workout_importer::inference::{
    InferenceImage, InferredExercise, InferredWorkout, ModelProvider, VisionModel,
};
use workout_importer::matcher::{apply_review_selection, BuiltinCatalog, ExerciseMatcher};
use workout_importer::request::ProcessRequest;
use workout_importer::service::{InferencePath, ProcessService};
use workout_importer::{CollectedPageData, Config};

/// Canned vision model that records how it was called
struct MockModel {
    calls: AtomicUsize,
    last_image_count: AtomicUsize,
    fail: bool,
}

impl MockModel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            last_image_count: AtomicUsize::new(0),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            last_image_count: AtomicUsize::new(0),
            fail: true,
        })
    }
}

#[async_trait]
impl VisionModel for MockModel {
    async fn infer_workout(
        &self,
        _text: &str,
        images: &[InferenceImage],
    ) -> anyhow::Result<InferredWorkout> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_image_count.store(images.len(), Ordering::SeqCst);

        if self.fail {
            anyhow::bail!("model unavailable");
        }

        Ok(InferredWorkout {
            workout_name: Some("Leg Day".to_string()),
            exercises: vec![
                InferredExercise {
                    name: "Barbell Squat".to_string(),
                    sets: 4,
                    reps: Some(8),
                    ..Default::default()
                },
                InferredExercise {
                    name: "mystery move 9000".to_string(),
                    ..Default::default()
                },
                InferredExercise {
                    name: "Romanian Deadlift".to_string(),
                    sets: 3,
                    reps: Some(10),
                    ..Default::default()
                },
            ],
            confidence: Some(0.9),
        })
    }

    async fn is_available(&self) -> bool {
        !self.fail
    }

    fn provider_type(&self) -> ModelProvider {
        ModelProvider::OpenAI
    }
}

/// Client payload carrying a structured item with workout sticker overlays
fn sticker_payload(sticker_count: usize) -> CollectedPageData {
    let stickers: Vec<serde_json::Value> = (0..sticker_count)
        .map(|i| {
            serde_json::json!({
                "stickerText": [format!("Exercise {}: squat 3x{}", i + 1, 8 + i)],
                "startTime": i as f64 * 5.0,
                "endTime": i as f64 * 5.0 + 4.0,
            })
        })
        .collect();

    CollectedPageData {
        video_detail: Some(serde_json::json!({
            "desc": "full leg day routine",
            "stickersOnItem": stickers,
        })),
        caption: Some("full leg day routine".to_string()),
        ..Default::default()
    }
    .finalize()
}

/// A rendered video page big enough to pass the full-page test, carrying
/// a hydration payload with six workout sticker overlays
fn hydrated_page() -> String {
    let stickers: Vec<serde_json::Value> = (0..6)
        .map(|i| {
            serde_json::json!({
                "stickerText": [format!("Exercise {}: squat 3x{}", i + 1, 8 + i)],
                "startTime": i as f64 * 5.0,
                "endTime": i as f64 * 5.0 + 4.0,
            })
        })
        .collect();

    let payload = serde_json::json!({
        "__DEFAULT_SCOPE__": {
            "webapp.video-detail": { "itemInfo": { "itemStruct": {
                "desc": "full leg day routine",
                "stickersOnItem": stickers,
                "video": {
                    "cover": "https://cdn.example/cover.jpg",
                    "duration": 30,
                },
            }}}
        }
    });

    format!(
        "<html><head></head><body>\
         <script id=\"__UNIVERSAL_DATA_FOR_REHYDRATION__\" type=\"application/json\">{}</script>\
         <!-- {} -->\
         </body></html>",
        payload,
        "x".repeat(60_000)
    )
}

/// Local stand-in for the video platform: serves the hydrated page at a
/// canonical video path and redirects a short-link path to it
async fn spawn_page_server() -> String {
    use axum::response::{Html, Redirect};
    use axum::routing::get;
    use axum::Router;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let page = hydrated_page();
    let canonical = format!("{}/@coach/video/7399999999999999999", base);

    let app = Router::new()
        .route(
            "/@coach/video/:id",
            get(move || {
                let page = page.clone();
                async move { Html(page) }
            }),
        )
        .route(
            "/go/vm.tiktok.com/:code",
            get(move || {
                let canonical = canonical.clone();
                async move { Redirect::temporary(&canonical) }
            }),
        );

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    base
}

fn request_with(url: &str, data: CollectedPageData, frames: Vec<String>) -> ProcessRequest {
    let mut request = ProcessRequest::build(url, data, &[]);
    request.video_frames = frames;
    request
}

fn service_with(model: Arc<MockModel>) -> ProcessService {
    ProcessService::new(Config::default(), model)
}

#[tokio::test]
async fn test_fast_path_end_to_end() {
    let model = MockModel::new();
    let service = service_with(model.clone());

    let request = request_with(
        "https://www.tiktok.com/@coach/video/7312345678901234567",
        sticker_payload(5),
        vec![],
    );

    let result = service.process(request).await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.path, Some(InferencePath::Fast));
    assert!(!result.cached);
    assert_eq!(result.workout_name.as_deref(), Some("Leg Day"));
    assert_eq!(result.exercises.len(), 3);
    assert_eq!(result.confidence, 0.9);
    // Fast path sends no images
    assert_eq!(model.last_image_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_second_request_served_from_cache() {
    let model = MockModel::new();
    let service = service_with(model.clone());
    let url = "https://www.tiktok.com/@coach/video/7300000000000000001";

    let first = service
        .process(request_with(url, sticker_payload(5), vec![]))
        .await;
    let second = service
        .process(request_with(url, sticker_payload(5), vec![]))
        .await;

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.exercises.len(), first.exercises.len());
    // The model ran exactly once
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_frames_path_forwards_client_frames() {
    let model = MockModel::new();
    let service = service_with(model.clone());

    // Two stickers is below the fast-path bar; three frames clear the
    // frames-path bar
    let frames = vec!["AQID".to_string(), "BAUG".to_string(), "BwgJ".to_string()];
    let request = request_with(
        "https://www.tiktok.com/@coach/video/7300000000000000002",
        sticker_payload(2),
        frames,
    );

    let result = service.process(request).await;

    assert!(result.success);
    assert_eq!(result.path, Some(InferencePath::Frames));
    assert_eq!(model.last_image_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_hollow_client_payload_falls_back_to_scrape() {
    let model = MockModel::new();
    let service = service_with(model.clone());
    let base = spawn_page_server().await;

    // Structured payload present but carrying nothing usable: the merge
    // comes up empty, so the server scrapes the page itself
    let hollow = CollectedPageData {
        video_detail: Some(serde_json::json!({})),
        ..Default::default()
    }
    .finalize();
    let request = request_with(
        &format!("{}/@coach/video/7399999999999999999", base),
        hollow,
        vec![],
    );

    let result = service.process(request).await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.path, Some(InferencePath::Fast));
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_signals_fail_before_inference() {
    let model = MockModel::new();
    let service = service_with(model.clone());

    // A hollow payload plus an unreachable page: the fallback scrape
    // fails too, and the request is declared hopeless
    let hollow = CollectedPageData {
        video_detail: Some(serde_json::json!({})),
        ..Default::default()
    }
    .finalize();
    let request = request_with("http://127.0.0.1:9/watch", hollow, vec![]);

    let result = service.process(request).await;

    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .contains("couldn't find any workout content"));
    // The model was never consulted
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_short_link_resolves_before_caching() {
    let model = MockModel::new();
    let service = service_with(model.clone());
    let base = spawn_page_server().await;

    let first = service
        .process(request_with(
            &format!("{}/go/vm.tiktok.com/ZMshort", base),
            CollectedPageData::default(),
            vec![],
        ))
        .await;

    assert!(first.success, "error: {:?}", first.error);
    assert!(!first.cached);

    // A spelling variant of the canonical URL lands on the cache entry
    // the resolved short link wrote
    let second = service
        .process(request_with(
            &format!("{}/@coach/video/7399999999999999999?lang=en", base),
            CollectedPageData::default(),
            vec![],
        ))
        .await;

    assert!(second.cached);
    assert_eq!(second.exercises.len(), first.exercises.len());
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_url_rejected() {
    let service = service_with(MockModel::new());

    let request = request_with("not a url at all", CollectedPageData::default(), vec![]);
    let result = service.process(request).await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("supported video URL"));
}

#[tokio::test]
async fn test_inference_failure_maps_to_generic_retryable_error() {
    let service = service_with(MockModel::failing());

    let request = request_with(
        "https://www.tiktok.com/@coach/video/7300000000000000004",
        sticker_payload(5),
        vec![],
    );
    let result = service.process(request).await;

    assert!(!result.success);
    let message = result.error.as_deref().unwrap();
    assert!(message.contains("try again"));
    // Internal detail never leaks to the client
    assert!(!message.contains("model unavailable"));
}

#[tokio::test]
async fn test_failed_results_are_not_cached() {
    let failing = MockModel::failing();
    let service = service_with(failing.clone());
    let url = "https://www.tiktok.com/@coach/video/7300000000000000005";

    let first = service
        .process(request_with(url, sticker_payload(5), vec![]))
        .await;
    let second = service
        .process(request_with(url, sticker_payload(5), vec![]))
        .await;

    assert!(!first.success);
    assert!(!second.cached);
    // Both attempts reached the model
    assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_matching_preserves_workout_shape_and_review_repairs_one() {
    let model = MockModel::new();
    let service = service_with(model);

    let request = request_with(
        "https://www.tiktok.com/@coach/video/7300000000000000006",
        sticker_payload(5),
        vec![],
    );
    let result = service.process(request).await;
    assert!(result.success);

    let matcher = ExerciseMatcher::new(
        Arc::new(BuiltinCatalog::new()),
        Config::default().matcher.clone(),
    );
    let mut matches = matcher.match_workout(&result.exercises);

    // Same cardinality and order as the inferred list
    assert_eq!(matches.len(), result.exercises.len());
    assert!(matches[0].matched);
    assert!(!matches[1].matched);
    assert!(matches[2].matched);

    // The user repairs the unmatched entry from a catalog search
    let candidates = matcher.search("kettlebell swing");
    let chosen = &candidates.first().unwrap().0;
    apply_review_selection(&mut matches, 1, chosen).unwrap();

    assert!(matches[1].matched);
    assert_eq!(matches[1].input_name, "mystery move 9000");
    assert!(matches[0].matched && matches[2].matched);
}
