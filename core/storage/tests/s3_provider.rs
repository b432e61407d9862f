//! S3 adapter tests against a mocked endpoint.
//!
//! The driver is opened with an `endpoint` credential pointing at an
//! httpmock server, which exercises the real SDK request path (path-style
//! addressing included) without a live bucket.

use httpmock::prelude::*;
use std::sync::Arc;

use nimbus_storage::{BucketContext, Credentials, ProviderDriver, StorageProvider};
use nimbus_storage::s3::S3Driver;

const BUCKET: &str = "data-acme-nimbus-io";

fn empty_listing_body() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
         <Name>{}</Name><KeyCount>0</KeyCount><MaxKeys>1000</MaxKeys>\
         <IsTruncated>false</IsTruncated></ListBucketResult>",
        BUCKET
    )
}

fn listing_body(keys: &[&str]) -> String {
    let contents: String = keys
        .iter()
        .map(|key| format!("<Contents><Key>{}</Key><Size>1</Size></Contents>", key))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
         <Name>{}</Name><KeyCount>{}</KeyCount><MaxKeys>1000</MaxKeys>\
         <IsTruncated>false</IsTruncated>{}</ListBucketResult>",
        BUCKET,
        keys.len(),
        contents
    )
}

async fn open_provider(server: &MockServer) -> Arc<dyn StorageProvider> {
    let credentials = Credentials::from_json(&format!(
        r#"{{"accessKeyId":"AKID","secretAccessKey":"SECRET","endpoint":"{}"}}"#,
        server.base_url()
    ))
    .unwrap();
    let ctx = BucketContext::new("acme", "https://api.example.com", false);
    S3Driver.open(ctx, credentials).await.unwrap()
}

#[tokio::test]
async fn test_open_reports_platform_bucket_name() {
    let server = MockServer::start();
    let provider = open_provider(&server).await;
    assert_eq!(provider.id(), "@nimbus/storage-s3");
    assert_eq!(provider.bucket(), BUCKET);
}

#[tokio::test]
async fn test_delete_files_with_no_matches_issues_no_bulk_delete() {
    let server = MockServer::start();
    let provider = open_provider(&server).await;

    let listing = server.mock(|when, then| {
        when.method(GET)
            .path(format!("/{}/", BUCKET))
            .query_param("list-type", "2")
            .query_param("prefix", "missing/");
        then.status(200)
            .header("content-type", "application/xml")
            .body(empty_listing_body());
    });
    let bulk_delete = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/{}/", BUCKET))
            .query_param_exists("delete");
        then.status(200)
            .header("content-type", "application/xml")
            .body("<DeleteResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"></DeleteResult>");
    });

    provider.delete_files(Some("missing/")).await.unwrap();

    listing.assert();
    bulk_delete.assert_hits(0);
}

#[tokio::test]
async fn test_delete_files_bulk_deletes_matches() {
    let server = MockServer::start();
    let provider = open_provider(&server).await;

    server.mock(|when, then| {
        when.method(GET)
            .path(format!("/{}/", BUCKET))
            .query_param("list-type", "2")
            .query_param("prefix", "logs/");
        then.status(200)
            .header("content-type", "application/xml")
            .body(listing_body(&["logs/a.txt", "logs/b.txt"]));
    });
    let bulk_delete = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/{}/", BUCKET))
            .query_param_exists("delete")
            .body_contains("logs/a.txt")
            .body_contains("logs/b.txt");
        then.status(200)
            .header("content-type", "application/xml")
            .body("<DeleteResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\"></DeleteResult>");
    });

    provider.delete_files(Some("logs/")).await.unwrap();
    bulk_delete.assert();
}

#[tokio::test]
async fn test_get_files_returns_listed_keys() {
    let server = MockServer::start();
    let provider = open_provider(&server).await;

    server.mock(|when, then| {
        when.method(GET)
            .path(format!("/{}/", BUCKET))
            .query_param("list-type", "2");
        then.status(200)
            .header("content-type", "application/xml")
            .body(listing_body(&["folder/a-file", "folder/b-file", "folder/c-file"]));
    });

    let names: Vec<String> = provider
        .get_files(Some("folder/"))
        .await
        .unwrap()
        .iter()
        .map(|file| file.name().to_string())
        .collect();
    assert_eq!(names, vec!["folder/a-file", "folder/b-file", "folder/c-file"]);
}

#[tokio::test]
async fn test_exists_maps_missing_object_to_false() {
    let server = MockServer::start();
    let provider = open_provider(&server).await;

    server.mock(|when, then| {
        when.method("HEAD").path(format!("/{}/missing.txt", BUCKET));
        then.status(404);
    });

    let file = provider.file("missing.txt");
    assert!(!file.exists().await.unwrap());
}

#[tokio::test]
async fn test_exists_true_for_present_object() {
    let server = MockServer::start();
    let provider = open_provider(&server).await;

    server.mock(|when, then| {
        when.method("HEAD").path(format!("/{}/greeting.txt", BUCKET));
        then.status(200)
            .header("content-type", "text/plain")
            .header("content-length", "12");
    });

    let file = provider.file("greeting.txt");
    assert!(file.exists().await.unwrap());
}

#[tokio::test]
async fn test_download_returns_exact_bytes() {
    let server = MockServer::start();
    let provider = open_provider(&server).await;

    server.mock(|when, then| {
        when.method(GET).path(format!("/{}/greeting.txt", BUCKET));
        then.status(200)
            .header("content-type", "text/plain")
            .body("Hello World!");
    });

    let data = provider.file("greeting.txt").download().await.unwrap();
    assert_eq!(data, b"Hello World!".to_vec());
}

#[tokio::test]
async fn test_save_puts_object_with_content_type() {
    let server = MockServer::start();
    let provider = open_provider(&server).await;

    let put = server.mock(|when, then| {
        when.method(PUT)
            .path(format!("/{}/greeting.txt", BUCKET))
            .header("content-type", "text/plain")
            .body("Hello World!");
        then.status(200).header("etag", "\"abc\"");
    });

    provider
        .file("greeting.txt")
        .save(b"Hello World!".to_vec(), "text/plain")
        .await
        .unwrap();
    put.assert();
}
