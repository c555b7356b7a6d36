use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use dashsync_core::{DashboardDocument, LiveAuth, LiveStore, Secret, StoreError};
use dashsync_grafana::GrafanaClient;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    target: String,
    authorization: String,
    body: String,
}

/// Serve exactly `responses.len()` requests, one connection each, replying in
/// order. Returns the base URL and a handle yielding the recorded requests.
fn serve(responses: Vec<(u16, Value)>) -> (String, JoinHandle<Vec<Recorded>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let url = format!("http://{}", listener.local_addr().expect("addr"));
    let handle = thread::spawn(move || {
        let mut recorded = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));

            let mut request_line = String::new();
            reader.read_line(&mut request_line).expect("request line");
            let mut parts = request_line.split_whitespace();
            let method = parts.next().unwrap_or_default().to_owned();
            let target = parts.next().unwrap_or_default().to_owned();

            let mut length = 0usize;
            let mut authorization = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("header");
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                let (name, value) = line.split_once(':').expect("header pair");
                match name.to_ascii_lowercase().as_str() {
                    "content-length" => length = value.trim().parse().expect("length"),
                    "authorization" => authorization = value.trim().to_owned(),
                    _ => {}
                }
            }
            let mut body_bytes = vec![0; length];
            reader.read_exact(&mut body_bytes).expect("body");

            let payload = body.to_string();
            write!(
                stream,
                "HTTP/1.1 {status} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                payload.len()
            )
            .expect("respond");
            recorded.push(Recorded {
                method,
                target,
                authorization,
                body: String::from_utf8(body_bytes).expect("utf8 body"),
            });
        }
        recorded
    });
    (url, handle)
}

fn client(url: &str) -> GrafanaClient {
    GrafanaClient::new(url, &LiveAuth::Token(Secret::new("t0ken"))).expect("client")
}

#[test]
fn search_maps_hits_and_defaults_the_general_folder() {
    let (url, server) = serve(vec![(
        200,
        json!([
            {"uid": "u1", "title": "cpu", "folderId": 4, "folderTitle": "ops", "type": "dash-db"},
            {"uid": "u2", "title": "home", "type": "dash-db"}
        ]),
    )]);

    let hits = client(&url).search_by_tag("sync").expect("search");
    let requests = server.join().expect("server");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].folder_id, 4);
    assert_eq!(hits[0].folder_title, "ops");
    assert_eq!(hits[1].folder_id, 0);
    assert_eq!(hits[1].folder_title, "General");
    assert_eq!(requests[0].method, "GET");
    assert!(requests[0].target.starts_with("/api/search?"));
    assert!(requests[0].target.contains("type=dash-db"));
    assert!(requests[0].target.contains("tag=sync"));
    assert_eq!(requests[0].authorization, "Bearer t0ken");
}

#[test]
fn dashboard_lookup_carries_the_folder_title() {
    let (url, server) = serve(vec![(
        200,
        json!({
            "dashboard": {"uid": "u1", "title": "cpu", "version": 9, "id": 12},
            "meta": {"folderTitle": "ops", "folderId": 4}
        }),
    )]);

    let document = client(&url)
        .get_by_uid("u1")
        .expect("lookup")
        .expect("present");
    let requests = server.join().expect("server");

    assert_eq!(document.folder_path, "ops");
    assert_eq!(document.revision(), 9);
    assert_eq!(requests[0].target, "/api/dashboards/uid/u1");
}

#[test]
fn uid_with_reserved_characters_stays_one_path_segment() {
    let (url, server) = serve(vec![(404, json!({"message": "Dashboard not found"}))]);
    let found = client(&url).get_by_uid("team/cpu?x#y").expect("lookup");
    let requests = server.join().expect("server");

    assert!(found.is_none());
    assert_eq!(requests[0].target, "/api/dashboards/uid/team%2Fcpu%3Fx%23y");
}

#[test]
fn missing_dashboard_is_none() {
    let (url, server) = serve(vec![(404, json!({"message": "Dashboard not found"}))]);
    let found = client(&url).get_by_uid("nope").expect("lookup");
    server.join().expect("server");
    assert!(found.is_none());
}

#[test]
fn save_overwrites_without_the_instance_id() {
    let (url, server) = serve(vec![(
        200,
        json!({"id": 40, "uid": "u1", "version": 10, "status": "success"}),
    )]);
    let document = DashboardDocument::from_model(
        "ops",
        json!({"uid": "u1", "title": "cpu", "id": 12, "version": 9}),
    )
    .expect("document");

    let status = client(&url)
        .create_or_update(&document, 4, "[SYNC] msg")
        .expect("save");
    let requests = server.join().expect("server");

    assert_eq!(status.version, 10);
    assert_eq!(status.status, "success");
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].target, "/api/dashboards/db");
    let body: Value = serde_json::from_str(&requests[0].body).expect("json body");
    assert_eq!(body["folderId"], 4);
    assert_eq!(body["message"], "[SYNC] msg");
    assert_eq!(body["overwrite"], true);
    assert_eq!(body["dashboard"]["id"], Value::Null);
    assert_eq!(body["dashboard"]["version"], 9);
}

#[test]
fn folders_are_looked_up_by_title_and_created_on_demand() {
    let (url, server) = serve(vec![
        (200, json!([{"id": 3, "uid": "f3", "title": "dev"}])),
        (200, json!({"id": 7, "uid": "f7", "title": "ops"})),
    ]);
    let mut grafana = client(&url);

    assert!(grafana.get_folder("ops").expect("lookup").is_none());
    let created = grafana.create_folder("ops").expect("create");
    let requests = server.join().expect("server");

    assert_eq!(created.id, 7);
    assert_eq!(requests[1].method, "POST");
    assert_eq!(requests[1].target, "/api/folders");
    let body: Value = serde_json::from_str(&requests[1].body).expect("json body");
    assert_eq!(body["title"], "ops");
}

#[test]
fn reserved_folder_needs_no_request() {
    // No server: any request would fail to connect.
    let mut grafana = client("http://127.0.0.1:9");
    let folder = grafana.get_folder("General").expect("reserved");
    assert_eq!(folder.map(|f| f.id), Some(0));
    assert_eq!(grafana.create_folder("General").expect("reserved").id, 0);
}

#[test]
fn error_status_becomes_a_remote_error() {
    let (url, server) = serve(vec![(403, json!({"message": "Permission denied"}))]);
    let err = client(&url).search_by_tag("sync").unwrap_err();
    server.join().expect("server");
    match err {
        StoreError::Remote { service, message } => {
            assert_eq!(service, "grafana");
            assert!(message.contains("403"));
            assert!(message.contains("Permission denied"));
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}
