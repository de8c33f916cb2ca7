#[path = "../src/api_client.rs"]
#[allow(dead_code)] // Some methods are used by the binary but not by tests
mod api_client;

use api_client::ApiClient;
use httpmock::Method::{GET, POST, PUT};
use httpmock::MockServer;
use serde_json::json;
use std::net::TcpListener;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use throwpro_core::{AbortSignal, CurveKind, ProgressQuery, UploadPolicy};

const TOKEN: &str = "secret-token";

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(&server.base_url(), TOKEN)
        .unwrap()
        .with_max_retries(0)
}

fn write_video(dir: &TempDir, name: &str, len: usize) -> PathBuf {
    let path = dir.path().join(name);
    let data: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}

fn small_chunks() -> UploadPolicy {
    UploadPolicy {
        chunk_size: 10,
        ..UploadPolicy::default()
    }
}

#[tokio::test]
async fn upload_sends_sequential_chunks_to_signed_url() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let temp = TempDir::new().unwrap();
    let path = write_video(&temp, "throw.mp4", 25);

    let init = server.mock(|when, then| {
        when.method(POST)
            .path("/uploads/init")
            .header("authorization", format!("Bearer {TOKEN}"))
            .json_body(json!({"filename": "throw.mp4", "content_type": "video/mp4"}));
        then.status(200).json_body(json!({
            "upload_url": server.url("/upload/s1"),
            "gs_uri": "gs://bucket/throw.mp4",
            "sessionId": "sess-1"
        }));
    });

    let chunks: Vec<_> = [
        ("bytes 0-9/25", 308),
        ("bytes 10-19/25", 308),
        ("bytes 20-24/25", 200),
    ]
    .into_iter()
    .map(|(range, status)| {
        server.mock(|when, then| {
            when.method(PUT)
                .path("/upload/s1")
                .header("content-range", range)
                .header("content-type", "video/mp4");
            then.status(status);
        })
    })
    .collect();

    let mut progress = Vec::new();
    let uploaded = client(&server)
        .upload_file(&path, None, &small_chunks(), &AbortSignal::never(), |d, t| {
            progress.push((d, t))
        })
        .await
        .unwrap();

    init.assert_hits(1);
    for chunk in &chunks {
        chunk.assert_hits(1);
    }
    assert_eq!(uploaded.session_id, "sess-1");
    assert_eq!(uploaded.gs_uri.as_deref(), Some("gs://bucket/throw.mp4"));
    assert_eq!(uploaded.report.bytes_sent, 25);
    assert_eq!(uploaded.report.requests, 3);
    assert_eq!(progress, vec![(10, 25), (20, 25), (25, 25)]);
}

#[tokio::test]
async fn upload_stops_at_first_rejected_chunk() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let temp = TempDir::new().unwrap();
    let path = write_video(&temp, "throw.mp4", 40);

    server.mock(|when, then| {
        when.method(POST).path("/uploads/init");
        then.status(200).json_body(json!({
            "upload_url": server.url("/upload/s2"),
            "sessionId": "sess-2"
        }));
    });
    let first = server.mock(|when, then| {
        when.method(PUT)
            .path("/upload/s2")
            .header("content-range", "bytes 0-9/40");
        then.status(308).header("range", "bytes=0-9");
    });
    let second = server.mock(|when, then| {
        when.method(PUT)
            .path("/upload/s2")
            .header("content-range", "bytes 10-19/40");
        then.status(403).body("signature expired");
    });
    let rest = server.mock(|when, then| {
        when.method(PUT)
            .path("/upload/s2")
            .header("content-range", "bytes 20-29/40");
        then.status(308);
    });

    let err = client(&server)
        .upload_file(&path, None, &small_chunks(), &AbortSignal::never(), |_, _| {})
        .await
        .unwrap_err();

    first.assert_hits(1);
    second.assert_hits(1);
    rest.assert_hits(0);
    let message = format!("{err:#}");
    assert!(message.contains("upload failed (403)"), "{message}");
    assert!(message.contains("signature expired"), "{message}");
}

#[tokio::test]
async fn upload_rejects_non_video_before_any_request() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let temp = TempDir::new().unwrap();
    let notes = write_video(&temp, "notes.txt", 12);
    let spaced = write_video(&temp, "my throw.mp4", 12);

    let init = server.mock(|when, then| {
        when.method(POST).path("/uploads/init");
        then.status(200);
    });

    let api = client(&server);
    let policy = UploadPolicy::default();
    let err = api
        .upload_file(&notes, None, &policy, &AbortSignal::never(), |_, _| {})
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("text/plain"));

    let err = api
        .upload_file(&spaced, None, &policy, &AbortSignal::never(), |_, _| {})
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("my throw.mp4"));

    let tiny = UploadPolicy {
        max_upload_bytes: 4,
        ..UploadPolicy::default()
    };
    let video = write_video(&temp, "throw.mp4", 12);
    assert!(
        api.upload_file(&video, None, &tiny, &AbortSignal::never(), |_, _| {})
            .await
            .is_err()
    );

    init.assert_hits(0);
}

#[tokio::test]
async fn upload_init_error_includes_status_and_body() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let temp = TempDir::new().unwrap();
    let path = write_video(&temp, "throw.mov", 5);

    server.mock(|when, then| {
        when.method(POST)
            .path("/uploads/init")
            .json_body(json!({"filename": "throw.mov", "content_type": "video/quicktime"}));
        then.status(401).body("bad token");
    });

    let err = client(&server)
        .upload_file(&path, None, &small_chunks(), &AbortSignal::never(), |_, _| {})
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "upload init failed (401): bad token");
}

#[tokio::test]
async fn features_are_cached_per_session_and_curves() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let features = server.mock(|when, then| {
        when.method(GET)
            .path("/sessions/sess-1/features")
            .query_param("v", "2")
            .query_param("curves", "separation,v_hand")
            .header("authorization", format!("Bearer {TOKEN}"));
        then.status(200).json_body(json!({
            "curves": {
                "separation": [{"t_ms": 0, "deg": 12.5}, {"t_ms": 10, "deg": 30}],
                "v_hand": [{"t_ms": 10, "norm": 0.9}]
            },
            "phases": {"drive": [0, 10]},
            "envelope": {"separation": {"band": [40, 20]}},
            "envelope_version": 2
        }));
    });

    let api = client(&server);
    let first = api
        .fetch_features("sess-1", &[CurveKind::VHand, CurveKind::Separation])
        .await
        .unwrap();
    let second = api
        .fetch_features("sess-1", &[CurveKind::Separation, CurveKind::VHand])
        .await
        .unwrap();

    features.assert_hits(1);
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    let separation = first.curve(&CurveKind::Separation).unwrap();
    assert_eq!(separation.points.len(), 2);
}

#[tokio::test]
async fn compare_fetches_both_sessions() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let a = server.mock(|when, then| {
        when.method(GET).path("/sessions/a/features");
        then.status(200).json_body(json!({
            "curves": {"separation": [{"t_ms": 0, "deg": 1}]}
        }));
    });
    let b = server.mock(|when, then| {
        when.method(GET).path("/sessions/b/features");
        then.status(200).json_body(json!({
            "curves": {"separation": [{"t_ms": 5, "deg": 2}]}
        }));
    });

    let api = client(&server);
    let (fa, fb) = api
        .compare("a", Some("b"), &[CurveKind::Separation])
        .await
        .unwrap();
    assert!(fa.curve(&CurveKind::Separation).is_some());
    assert!(fb.is_some());

    let (_, none) = api.compare("a", None, &[CurveKind::Separation]).await.unwrap();
    assert!(none.is_none());

    a.assert_hits(1);
    b.assert_hits(1);
}

#[tokio::test]
async fn features_error_reports_status() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/sessions/missing/features");
        then.status(404).body("session not found");
    });

    let err = client(&server)
        .fetch_features("missing", &CurveKind::DEFAULTS)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "features failed (404): session not found");
}

#[tokio::test]
async fn reads_retry_server_errors() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let health = server.mock(|when, then| {
        when.method(GET).path("/healthz");
        then.status(503).body("warming up");
    });

    let err = ApiClient::new(&server.base_url(), TOKEN)
        .unwrap()
        .with_max_retries(2)
        .with_retry_base_delay(Duration::from_millis(1))
        .health()
        .await
        .unwrap_err();

    health.assert_hits(3);
    assert!(err.to_string().contains("health failed (503)"));
}

#[tokio::test]
async fn progress_follows_cursors() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let page_two = server.mock(|when, then| {
        when.method(GET)
            .path("/athletes/ath-1/progress")
            .query_param("cursor", "c2");
        then.status(200).json_body(json!({
            "items": [{"id": "s3", "total": 64.0}],
            "next_cursor": null
        }));
    });
    let page_one = server.mock(|when, then| {
        when.method(GET)
            .path("/athletes/ath-1/progress")
            .query_param("limit", "2");
        then.status(200).json_body(json!({
            "items": [
                {"id": "s1", "created_at": "2024-05-01T10:00:00Z", "total": 70.5},
                {"id": "s2", "total": "n/a"}
            ],
            "next_cursor": "c2"
        }));
    });

    let query = ProgressQuery {
        limit: Some(2),
        ..ProgressQuery::default()
    };
    let api = client(&server);

    let first = api.fetch_progress("ath-1", &query).await.unwrap();
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.next_cursor.as_deref(), Some("c2"));

    let all = api.fetch_all_progress("ath-1", &query).await.unwrap();
    let ids: Vec<_> = all.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2", "s3"]);
    assert!(all.next_cursor.is_none());

    page_one.assert_hits(2);
    page_two.assert_hits(1);
}

#[tokio::test]
async fn progress_stops_on_repeated_cursor() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let pages = server.mock(|when, then| {
        when.method(GET).path("/athletes/ath-2/progress");
        then.status(200).json_body(json!({
            "items": [{"id": "s1"}],
            "next_cursor": "same"
        }));
    });

    let all = client(&server)
        .fetch_all_progress("ath-2", &ProgressQuery::default())
        .await
        .unwrap();
    assert_eq!(all.items.len(), 2);
    pages.assert_hits(2);
}

#[tokio::test]
async fn progress_continues_past_filtered_page() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let last = server.mock(|when, then| {
        when.method(GET)
            .path("/athletes/ath-3/progress")
            .query_param("cursor", "c2");
        then.status(200).json_body(json!({
            "items": [{"id": "s9", "total": 68.0}],
            "next_cursor": null
        }));
    });
    let filtered = server.mock(|when, then| {
        when.method(GET)
            .path("/athletes/ath-3/progress")
            .query_param("cursor", "c1");
        then.status(200).json_body(json!({"items": [], "next_cursor": "c2"}));
    });
    let first = server.mock(|when, then| {
        when.method(GET).path("/athletes/ath-3/progress");
        then.status(200).json_body(json!({
            "items": [{"id": "s1", "total": 61.0}],
            "next_cursor": "c1"
        }));
    });

    let all = client(&server)
        .fetch_all_progress("ath-3", &ProgressQuery::default())
        .await
        .unwrap();
    let ids: Vec<_> = all.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s9"]);

    first.assert_hits(1);
    filtered.assert_hits(1);
    last.assert_hits(1);
}

#[tokio::test]
async fn ids_stay_inside_their_path_segment() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let admin = server.mock(|when, then| {
        when.method(GET).path("/admin/features");
        then.status(200).json_body(json!({}));
    });
    let session = server.mock(|when, then| {
        when.method(GET)
            .path_contains("/sessions/")
            .path_contains("admin")
            .path_contains("/features")
            .query_param("v", "2");
        then.status(404).body("session not found");
    });

    let api = client(&server);
    let err = api
        .fetch_features("../admin", &[CurveKind::Separation])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("features failed (404)"), "{err:#}");
    admin.assert_hits(0);
    session.assert_hits(1);

    for id in ["", ".", ".."] {
        let err = api
            .fetch_features(id, &[CurveKind::Separation])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid session id"), "{err:#}");
        assert!(api.retry_session(id).await.is_err());
        assert!(
            api.fetch_progress(id, &ProgressQuery::default())
                .await
                .is_err()
        );
    }
    admin.assert_hits(0);
    session.assert_hits(1);
}

#[tokio::test]
async fn upload_sends_trimmed_filename() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let temp = TempDir::new().unwrap();
    let path = write_video(&temp, " throw.mp4 ", 4);

    let init = server.mock(|when, then| {
        when.method(POST)
            .path("/uploads/init")
            .json_body(json!({"filename": "throw.mp4", "content_type": "video/mp4"}));
        then.status(200).json_body(json!({
            "upload_url": server.url("/upload/s3"),
            "sessionId": "sess-3"
        }));
    });
    let chunk = server.mock(|when, then| {
        when.method(PUT)
            .path("/upload/s3")
            .header("content-range", "bytes 0-3/4");
        then.status(200);
    });

    let uploaded = client(&server)
        .upload_file(&path, Some("video/mp4"), &small_chunks(), &AbortSignal::never(), |_, _| {})
        .await
        .unwrap();

    init.assert_hits(1);
    chunk.assert_hits(1);
    assert_eq!(uploaded.session_id, "sess-3");
}

#[tokio::test]
async fn maintenance_endpoints() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let retry = server.mock(|when, then| {
        when.method(POST)
            .path("/sessions/sess-9/retry")
            .header("authorization", format!("Bearer {TOKEN}"));
        then.status(200).json_body(json!({"ok": true}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/admin/me");
        then.status(200).json_body(json!({"isAdmin": true}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/healthz");
        then.status(200).json_body(json!({"ok": true}));
    });

    let api = client(&server);
    assert!(api.retry_session("sess-9").await.unwrap().ok);
    assert!(api.admin_me().await.unwrap().is_admin);
    assert!(api.health().await.unwrap().ok);
    retry.assert_hits(1);
}
