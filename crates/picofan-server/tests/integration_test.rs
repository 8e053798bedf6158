//! Integration tests for the PicoFan web server.
//!
//! These tests bind a real listener on localhost, talk raw HTTP over a
//! `TcpStream` and check what ends up in the flash root.

use std::collections::BTreeSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::{self, pki_types::ServerName};
use tokio_rustls::TlsConnector;

use picofan_server::device::RadioState;
use picofan_server::{
    DeviceContext, HostDevice, ManagementService, ProvisioningService, ProvisioningState,
    Server, ServerConfig, SimulatedRadio,
};

fn test_config() -> ServerConfig {
    ServerConfig {
        bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        http_port: 0,
        https_port: 0,
        reboot_delay: Duration::from_millis(10),
        credentials_delay: Duration::from_millis(10),
        ..ServerConfig::default()
    }
}

/// Start the management service on a flash root and return its address.
async fn start_management(root: &Path) -> (SocketAddr, Arc<HostDevice>) {
    let config = test_config();
    let context = DeviceContext::new(root);
    let device = Arc::new(HostDevice::new());
    let service = ManagementService::new(context.clone(), config.reboot_delay);

    let server = Server::bind(&config, &context, service, device.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    (addr, device)
}

/// Send a raw request and return the response head and body.
async fn exchange(addr: SocketAddr, request: &[u8]) -> (String, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut response = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("response timed out")
        .unwrap();

    let split = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = String::from_utf8(response[..split].to_vec()).unwrap();
    (head, response[split + 4..].to_vec())
}

fn url_encoded_post(body: &str) -> Vec<u8> {
    format!(
        "POST / HTTP/1.1\r\nHost: picofan\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}

fn multipart_post(boundary: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let mut request = format!(
        "POST / HTTP/1.1\r\nHost: picofan\r\nContent-Type: multipart/form-data; boundary={boundary}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(&body);
    request
}

async fn restarted(device: &HostDevice) -> bool {
    timeout(Duration::from_secs(2), device.restarted())
        .await
        .is_ok()
}

async fn stays_up(device: &HostDevice) -> bool {
    timeout(Duration::from_millis(200), device.restarted())
        .await
        .is_err()
}

#[tokio::test]
async fn test_provisioning_captures_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let context = DeviceContext::new(dir.path());
    let radio = Arc::new(SimulatedRadio::new(["HomeNet", "", "Cafe"]));
    let device = Arc::new(HostDevice::new());

    let service = ProvisioningService::start(
        radio.clone(),
        &context,
        &config.access_point,
        config.credentials_delay,
    )
    .unwrap();
    let server = Server::bind(&config, &context, service, device.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let service = server.service().clone();
    tokio::spawn(server.run());

    let (head, body) = exchange(addr, b"GET / HTTP/1.1\r\nHost: 192.168.4.1\r\n\r\n").await;
    let page = String::from_utf8(body).unwrap();
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(page.contains("<option value=\"HomeNet\">HomeNet</option>"));
    assert!(page.contains("<option value=\"Cafe\">Cafe</option>"));
    assert_eq!(page.matches("<option").count(), 2);

    let (head, body) = exchange(addr, &url_encoded_post("ssid=HomeNet&password=secret123")).await;
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(String::from_utf8(body).unwrap().contains("WiFi credentials saved"));

    let stored = fs::read_to_string(dir.path().join("ssid_credentials")).unwrap();
    let json: serde_json::Value =
        serde_json::from_slice(&STANDARD.decode(stored.trim()).unwrap()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"ssid": "HomeNet", "password": "secret123"})
    );

    assert!(restarted(&device).await);
    assert_eq!(service.state(), ProvisioningState::Rebooting);
    assert_eq!(radio.state(), RadioState::Idle);
}

#[tokio::test]
async fn test_provisioning_rejects_missing_ssid() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let context = DeviceContext::new(dir.path());
    let device = Arc::new(HostDevice::new());
    let service = ProvisioningService::start(
        Arc::new(SimulatedRadio::new(["HomeNet"])),
        &context,
        &config.access_point,
        config.credentials_delay,
    )
    .unwrap();
    let server = Server::bind(&config, &context, service, device.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let (head, _) = exchange(addr, &url_encoded_post("password=secret123")).await;
    assert!(head.starts_with("HTTP/1.1 400 Bad Request"));
    assert!(context.needs_provisioning());
    assert!(stays_up(&device).await);
}

#[tokio::test]
async fn test_settings_page_and_write() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("config.json"),
        r#"{"hostname": {"hostname": "old"}, "fan": {"num_fans": 1, "max_fan": 3, "pin_fan_1": 16}}"#,
    )
    .unwrap();
    let (addr, device) = start_management(dir.path()).await;

    let (head, body) = exchange(addr, b"GET / HTTP/1.1\r\n\r\n").await;
    let page = String::from_utf8(body).unwrap();
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(head.contains("Content-Type: text/html"));
    assert!(page.find("<h2>hostname</h2>").unwrap() < page.find("<h2>fan</h2>").unwrap());
    assert!(page.contains("<option value=1 selected=\"selected\">1</option>"));
    assert!(page.contains("<option value=3>3</option>"));
    assert!(stays_up(&device).await);

    let (head, body) =
        exchange(addr, &url_encoded_post("hostname_hostname=picofan&fan_num_fans=2")).await;
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(String::from_utf8(body).unwrap().contains("Updated Configs Saved"));

    // Full replace: fields that were not submitted are gone
    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("config.json")).unwrap())
            .unwrap();
    assert_eq!(
        saved,
        serde_json::json!({"hostname": {"hostname": "picofan"}, "fan": {"num_fans": 2}})
    );
    assert!(restarted(&device).await);
}

#[tokio::test]
async fn test_unrecognized_form_is_rejected_without_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, device) = start_management(dir.path()).await;

    let (head, _) = exchange(addr, &url_encoded_post("fan_num_fans=2")).await;
    assert!(head.starts_with("HTTP/1.1 400 Bad Request"));
    assert!(!dir.path().join("config.json").exists());
    assert!(stays_up(&device).await);
}

#[tokio::test]
async fn test_multipart_upload() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, device) = start_management(dir.path()).await;

    let (head, body) = exchange(addr, &multipart_post("XYZ", "report.txt", b"hello world")).await;
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(String::from_utf8(body).unwrap().contains("report.txt"));
    assert_eq!(
        fs::read(dir.path().join("report.txt")).unwrap(),
        b"hello world"
    );
    assert!(restarted(&device).await);
}

#[tokio::test]
async fn test_multipart_upload_spanning_windows() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _device) = start_management(dir.path()).await;

    // Line breaks and dashes close to the delimiter at every offset
    let content: Vec<u8> = b"\r\n--XY\r\n-"
        .iter()
        .copied()
        .cycle()
        .take(1200)
        .collect();
    let (head, _) = exchange(addr, &multipart_post("XYZ", "curve.bin", &content)).await;

    assert!(head.starts_with("HTTP/1.1 200 OK"));
    let stored = fs::read(dir.path().join("curve.bin")).unwrap();
    assert_eq!(stored.len(), 1200);
    assert_eq!(stored, content);
}

#[tokio::test]
async fn test_delete_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("b")).unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();
    fs::write(dir.path().join("b/c.txt"), "c").unwrap();
    fs::write(dir.path().join("keep.txt"), "k").unwrap();
    let (addr, device) = start_management(dir.path()).await;

    let (head, body) = exchange(addr, b"GET /delete HTTP/1.1\r\n\r\n").await;
    let form = String::from_utf8(body).unwrap();
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(form.contains("name=\"b/c.txt\""));
    assert!(form.contains("name=\"delete\""));

    let (head, body) = exchange(
        addr,
        &url_encoded_post("delete=delete&a.txt=a.txt&b%2Fc.txt=b%2Fc.txt"),
    )
    .await;
    let report = String::from_utf8(body).unwrap();
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(report.contains("<li>a.txt</li>"));
    assert!(report.contains("<li>b/c.txt</li>"));

    let remaining: BTreeSet<String> = DeviceContext::new(dir.path())
        .files
        .list_files()
        .unwrap()
        .collect();
    assert_eq!(remaining, BTreeSet::from(["keep.txt".to_string()]));
    assert!(restarted(&device).await);
}

#[tokio::test]
async fn test_delete_missing_file_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();
    let (addr, device) = start_management(dir.path()).await;

    let (head, _) = exchange(addr, &url_encoded_post("delete=delete&a.txt=a.txt&ghost.txt=ghost.txt")).await;
    assert!(head.starts_with("HTTP/1.1 404 Not Found"));
    assert!(dir.path().join("a.txt").exists());
    // The reboot still follows a failed mutation
    assert!(restarted(&device).await);
}

#[tokio::test]
async fn test_static_asset() {
    let dir = tempfile::tempdir().unwrap();
    let stylesheet = "body { font-family: sans-serif; }\n.tooltip { position: relative; }\n";
    fs::create_dir(dir.path().join("static")).unwrap();
    fs::write(dir.path().join("static/custom.css"), stylesheet).unwrap();
    let (addr, _device) = start_management(dir.path()).await;

    let (head, body) = exchange(addr, b"GET /custom.css HTTP/1.1\r\n\r\n").await;
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(head.contains("Content-Type: text/css"));
    assert!(head.contains(&format!("Content-Length: {}", stylesheet.len())));
    assert_eq!(body, stylesheet.as_bytes());
}

#[tokio::test]
async fn test_unknown_route_and_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _device) = start_management(dir.path()).await;

    let (head, _) = exchange(addr, b"GET /robots.txt HTTP/1.1\r\n\r\n").await;
    assert!(head.starts_with("HTTP/1.1 404 Not Found"));

    let (head, _) = exchange(addr, b"GET /favicon.ico HTTP/1.1\r\n\r\n").await;
    assert!(head.starts_with("HTTP/1.1 404 Not Found"));

    let (head, _) = exchange(addr, b"BREW /pot HTTP/1.1\r\n\r\n").await;
    assert!(head.starts_with("HTTP/1.1 400 Bad Request"));
}

#[tokio::test]
async fn test_settings_page_over_tls() {
    let dir = tempfile::tempdir().unwrap();
    let key_pair = rcgen::KeyPair::generate().unwrap();
    let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
        .unwrap()
        .self_signed(&key_pair)
        .unwrap();
    fs::write(dir.path().join("cert.der"), cert.der()).unwrap();
    fs::write(dir.path().join("key.der"), key_pair.serialize_der()).unwrap();
    fs::write(
        dir.path().join("config.json"),
        r#"{"hostname": {"hostname": "picofan"}}"#,
    )
    .unwrap();

    let config = test_config();
    let context = DeviceContext::new(dir.path());
    let service = ManagementService::new(context.clone(), config.reboot_delay);
    let server = Server::bind(&config, &context, service, Arc::new(HostDevice::new()))
        .await
        .unwrap();
    assert!(server.is_secure());
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let mut roots = rustls::RootCertStore::empty();
    roots.add(cert.der().clone()).unwrap();
    let client_config =
        rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(client_config));

    let tcp = TcpStream::connect(addr).await.unwrap();
    let mut stream = connector
        .connect(ServerName::try_from("localhost").unwrap(), tcp)
        .await
        .unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let mut response = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("response timed out")
        .unwrap();
    let response = String::from_utf8(response).unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("<h2>hostname</h2>"));
}
