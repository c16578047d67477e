//! `VisionClient` request/response plumbing against the offline double
//! (spec.md §4.6).

use coglet_core::vision::client::{MockVisionTransport, VisionClient};
use coglet_core::vision::detection::{highest_score, Detection};
use std::collections::VecDeque;
use std::time::Duration;

fn detection(score: f32, cx: f32, cy: f32) -> Detection {
    Detection { score, x: 0.0, y: 0.0, w: 10.0, h: 10.0, center_x: cx, center_y: cy }
}

#[test]
fn invoke_once_returns_queued_response_in_order() {
    let mut responses = VecDeque::new();
    responses.push_back(Ok(vec![detection(0.9, 320.0, 240.0)]));
    responses.push_back(Ok(Vec::new()));
    let client = VisionClient::new(Box::new(MockVisionTransport { responses }));

    let first = client.invoke_once(Duration::from_millis(50)).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].score, 0.9);

    let second = client.invoke_once(Duration::from_millis(50)).unwrap();
    assert!(second.is_empty());
}

#[test]
fn missing_response_defaults_to_no_detections() {
    let client = VisionClient::new(Box::new(MockVisionTransport::default()));
    let result = client.invoke_once(Duration::from_millis(10)).unwrap();
    assert!(result.is_empty());
}

#[test]
fn highest_score_picks_the_best_detection() {
    let detections = vec![detection(0.2, 1.0, 1.0), detection(0.8, 2.0, 2.0), detection(0.5, 3.0, 3.0)];
    let best = highest_score(&detections).unwrap();
    assert_eq!(best.score, 0.8);
}
