//! Batch-uploads every file under a local directory to a running weeder proxy instance: a
//! thin client that walks a directory tree and issues one `POST /filer/<relative-path>` per
//! file, logging the resulting fid. It has no dependency on weeder's internals, only on its
//! HTTP surface.

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::{Request, StatusCode};
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "weeder-uploader", about = "Batch-upload a directory tree to a weeder proxy")]
struct Args {
    /// Base URL of the weeder proxy, e.g. http://localhost:8080
    #[arg(long)]
    proxy: String,

    /// Local directory to upload recursively
    #[arg(long)]
    dir: PathBuf,

    /// Filer path prefix to upload under, e.g. /buckets/backup
    #[arg(long, default_value = "/uploads")]
    prefix: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let client: Client<_, Full<Bytes>> = Client::builder(TokioExecutor::new()).build_http();

    let mut files = Vec::new();
    collect_files(&args.dir, &mut files);

    let mut failures = 0usize;
    for file in &files {
        let rel = file.strip_prefix(&args.dir).unwrap_or(file);
        let remote_path = format!("{}/{}", args.prefix.trim_end_matches('/'), rel.to_string_lossy());
        match upload_one(&client, &args.proxy, &remote_path, file).await {
            Ok(fid) => tracing::info!(path = %remote_path, fid = %fid, "uploaded"),
            Err(e) => {
                failures += 1;
                tracing::error!(path = %remote_path, error = %e, "upload failed");
            }
        }
    }

    tracing::info!(total = files.len(), failures, "upload run complete");
    if failures > 0 {
        std::process::exit(1);
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

async fn upload_one(
    client: &Client<hyper_util::client::legacy::connect::HttpConnector, Full<Bytes>>,
    proxy: &str,
    remote_path: &str,
    local_file: &Path,
) -> Result<String, Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(local_file).await?;
    let filename = local_file.file_name().unwrap_or_default().to_string_lossy().to_string();
    let boundary = "----weeder-uploader-boundary";

    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(&bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let uri = format!("{}/filer{}", proxy.trim_end_matches('/'), remote_path);
    let req = Request::post(uri)
        .header("Content-Type", format!("multipart/form-data; boundary={boundary}"))
        .body(Full::new(Bytes::from(body)))?;

    let resp = client.request(req).await?;
    if resp.status() != StatusCode::OK {
        return Err(format!("upstream returned {}", resp.status()).into());
    }
    let body = resp.into_body().collect().await?.to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body)?;
    let fid = parsed
        .pointer("/result/0/fid")
        .and_then(|v| v.as_str())
        .ok_or("response had no fid")?;
    Ok(fid.to_string())
}
