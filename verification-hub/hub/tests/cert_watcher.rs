// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

pub mod common;

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use anyhow::Result;
use common::test_data;
use rustls::{
    crypto::ring,
    pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer, ServerName},
    server::Acceptor,
    ClientConfig, RootCertStore,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tokio_rustls::{LazyConfigAcceptor, TlsConnector};
use verification_hub::tls::{CertPaths, CertWatcher};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const POLL_ATTEMPTS: u32 = 100;

fn fixture(name: &str) -> PathBuf {
    test_data(&format!("tls/{name}"))
}

fn leaf_of(name: &str) -> CertificateDer<'static> {
    CertificateDer::pem_file_iter(fixture(name))
        .expect("open certificate")
        .next()
        .expect("one certificate")
        .expect("parse certificate")
}

/// Copy `server-N.crt`/`server-N.key` into `dir` as `tls.crt`/`tls.key`.
fn install(dir: &Path, server: &str, ca: bool) -> CertPaths {
    let cert = dir.join("tls.crt");
    let key = dir.join("tls.key");
    std::fs::copy(fixture(&format!("{server}.crt")), &cert).unwrap();
    std::fs::copy(fixture(&format!("{server}.key")), &key).unwrap();
    let ca_cert = ca.then(|| {
        let path = dir.join("ca.crt");
        std::fs::copy(fixture("ca.crt"), &path).unwrap();
        path
    });
    CertPaths::new(ca_cert, cert, key)
}

fn current_leaf(watcher: &CertWatcher) -> CertificateDer<'static> {
    watcher.current_bundle().expect("started").cert_chain()[0].clone()
}

fn wait_for_leaf(watcher: &CertWatcher, expected: &CertificateDer<'_>) -> bool {
    for _ in 0..POLL_ATTEMPTS {
        if current_leaf(watcher).as_ref() == expected.as_ref() {
            return true;
        }
        thread::sleep(POLL_INTERVAL);
    }
    false
}

#[test]
fn start_fails_without_certificate() {
    let dir = tempfile::tempdir().unwrap();
    let watcher = CertWatcher::new(CertPaths::new(
        None,
        dir.path().join("tls.crt"),
        dir.path().join("tls.key"),
    ));
    assert!(watcher.start().is_err());
    assert!(watcher.current_config().is_err());
}

#[test]
fn failed_start_publishes_nothing_and_can_be_retried() {
    let dir = tempfile::tempdir().unwrap();
    let paths = install(dir.path(), "server-1", false);
    std::fs::write(&paths.key_path, b"not a key").unwrap();

    let watcher = CertWatcher::new(paths.clone());
    assert!(watcher.start().is_err());
    assert!(watcher.current_bundle().is_err());

    // files are not watched after a failed start
    std::fs::copy(fixture("server-1.key"), &paths.key_path).unwrap();
    thread::sleep(Duration::from_millis(500));
    assert!(watcher.current_bundle().is_err());

    watcher.start().expect("start watcher");
    assert_eq!(current_leaf(&watcher), leaf_of("server-1.crt"));
    watcher.stop();
}

#[test]
fn rotation_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let paths = install(dir.path(), "server-1", false);
    let watcher = CertWatcher::new(paths.clone());
    watcher.start().expect("start watcher");
    assert_eq!(current_leaf(&watcher), leaf_of("server-1.crt"));

    std::fs::write(&paths.key_path, std::fs::read(fixture("server-2.key")).unwrap()).unwrap();
    std::fs::write(&paths.cert_path, std::fs::read(fixture("server-2.crt")).unwrap()).unwrap();
    assert!(wait_for_leaf(&watcher, &leaf_of("server-2.crt")));

    watcher.stop();
}

#[test]
fn invalid_bytes_keep_the_previous_certificate() {
    let dir = tempfile::tempdir().unwrap();
    let paths = install(dir.path(), "server-1", false);
    let watcher = CertWatcher::new(paths.clone());
    watcher.start().expect("start watcher");

    std::fs::write(&paths.cert_path, b"-----BEGIN CERTIFICATE-----\ngarbage\n").unwrap();
    thread::sleep(Duration::from_millis(500));
    assert_eq!(current_leaf(&watcher), leaf_of("server-1.crt"));

    // a later valid write still gets through
    std::fs::write(&paths.cert_path, std::fs::read(fixture("server-1.crt")).unwrap()).unwrap();
    std::fs::write(&paths.key_path, std::fs::read(fixture("server-2.key")).unwrap()).unwrap();
    std::fs::write(&paths.cert_path, std::fs::read(fixture("server-2.crt")).unwrap()).unwrap();
    assert!(wait_for_leaf(&watcher, &leaf_of("server-2.crt")));
}

#[test]
fn removed_file_is_watched_again() {
    let dir = tempfile::tempdir().unwrap();
    let paths = install(dir.path(), "server-1", false);
    let watcher = CertWatcher::new(paths.clone());
    watcher.start().expect("start watcher");

    std::fs::write(&paths.key_path, std::fs::read(fixture("server-2.key")).unwrap()).unwrap();
    std::fs::remove_file(&paths.cert_path).unwrap();
    thread::sleep(Duration::from_millis(200));
    std::fs::write(&paths.cert_path, std::fs::read(fixture("server-2.crt")).unwrap()).unwrap();
    assert!(wait_for_leaf(&watcher, &leaf_of("server-2.crt")));

    // and the next rotation after the re-watch is seen too
    std::fs::write(&paths.key_path, std::fs::read(fixture("server-1.key")).unwrap()).unwrap();
    std::fs::write(&paths.cert_path, std::fs::read(fixture("server-1.crt")).unwrap()).unwrap();
    assert!(wait_for_leaf(&watcher, &leaf_of("server-1.crt")));
}

/// Accept one connection, configured per handshake by `watcher`.
async fn serve_once(listener: TcpListener, watcher: Arc<CertWatcher>) -> Result<()> {
    let (stream, _) = listener.accept().await?;
    let start = LazyConfigAcceptor::new(Acceptor::default(), stream).await?;
    let config = watcher.config_for_client(&start.client_hello())?;
    let mut stream = start.into_stream(config).await?;
    stream.write_all(b"hello").await?;
    stream.shutdown().await?;
    Ok(())
}

fn client_config(client_auth: bool) -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.add(leaf_of("ca.crt"))?;
    let builder = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots);
    let config = if client_auth {
        let chain = vec![leaf_of("client.crt")];
        let key = PrivateKeyDer::from_pem_file(fixture("client.key"))
            .map_err(|e| anyhow::anyhow!("parse client key: {e:?}"))?;
        builder.with_client_auth_cert(chain, key)?
    } else {
        builder.with_no_client_auth()
    };
    Ok(config)
}

/// Connect to `addr` and return the leaf certificate the server presented.
async fn handshake(addr: SocketAddr, client_auth: bool) -> Result<CertificateDer<'static>> {
    let connector = TlsConnector::from(Arc::new(client_config(client_auth)?));
    let stream = TcpStream::connect(addr).await?;
    let mut stream = connector
        .connect(ServerName::try_from("localhost")?, stream)
        .await?;
    let mut greeting = Vec::new();
    stream.read_to_end(&mut greeting).await?;
    anyhow::ensure!(greeting == b"hello", "unexpected greeting");

    let (_, connection) = stream.get_ref();
    let leaf = connection
        .peer_certificates()
        .and_then(|chain| chain.first())
        .ok_or_else(|| anyhow::anyhow!("no server certificate"))?;
    Ok(leaf.clone().into_owned())
}

async fn connect_once(
    watcher: Arc<CertWatcher>,
    client_auth: bool,
) -> (Result<()>, Result<CertificateDer<'static>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_once(listener, watcher));
    let client = handshake(addr, client_auth).await;
    (server.await.expect("server task"), client)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_handshake_sees_the_latest_certificate() {
    let dir = tempfile::tempdir().unwrap();
    let paths = install(dir.path(), "server-1", false);
    let watcher = Arc::new(CertWatcher::new(paths.clone()));
    watcher.start().expect("start watcher");

    let (server, client) = connect_once(watcher.clone(), false).await;
    server.expect("first handshake");
    assert_eq!(client.expect("first handshake"), leaf_of("server-1.crt"));

    std::fs::write(&paths.key_path, std::fs::read(fixture("server-2.key")).unwrap()).unwrap();
    std::fs::write(&paths.cert_path, std::fs::read(fixture("server-2.crt")).unwrap()).unwrap();
    let expected = leaf_of("server-2.crt");
    let rotated = {
        let watcher = watcher.clone();
        tokio::task::spawn_blocking(move || wait_for_leaf(&watcher, &expected))
            .await
            .unwrap()
    };
    assert!(rotated);

    let (server, client) = connect_once(watcher.clone(), false).await;
    server.expect("second handshake");
    assert_eq!(client.expect("second handshake"), leaf_of("server-2.crt"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_certificate_is_required_with_a_ca() {
    let dir = tempfile::tempdir().unwrap();
    let watcher = Arc::new(CertWatcher::new(install(dir.path(), "server-1", true)));
    watcher.start().expect("start watcher");
    assert!(watcher.current_bundle().unwrap().requires_client_auth());

    let (server, client) = connect_once(watcher.clone(), true).await;
    server.expect("handshake with client certificate");
    assert_eq!(client.expect("handshake"), leaf_of("server-1.crt"));

    let (server, _) = connect_once(watcher.clone(), false).await;
    assert!(server.is_err(), "a client without certificate must be rejected");
}
