// apstream transport-layer benchmarks using criterion.
//
// Measures:
//   - Plain frame encode / decode throughput
//   - Encrypted frame round trip over an in-memory pipe
//   - Full session authentication over an in-memory pipe

use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput,
};
use std::time::{Duration, Instant};

use aptrust::crypto::kdf::DirectionKeys;
use aptrust::{CredentialKind, Credentials, DirectionalCipher, Responder, Welcome};
use apstream::frame::{decode_plain, encode_plain};
use apstream::{Command, EncryptedTransport, PlainTransport, SessionConfig, SessionController};
use bytes::BytesMut;
use tokio::io::{duplex, DuplexStream};
use tokio::runtime::Runtime;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

fn keys(seed: u8) -> DirectionKeys {
    DirectionKeys {
        cipher_key: [seed; 32],
        mac_key: [!seed; 32],
    }
}

fn encrypted_pair() -> (
    EncryptedTransport<DuplexStream>,
    EncryptedTransport<DuplexStream>,
) {
    let (a, b) = duplex(1024 * 1024);
    let client = EncryptedTransport::new(
        PlainTransport::new(a, IO_TIMEOUT),
        DirectionalCipher::new(keys(1)),
        DirectionalCipher::new(keys(2)),
    );
    let server = EncryptedTransport::new(
        PlainTransport::new(b, IO_TIMEOUT),
        DirectionalCipher::new(keys(2)),
        DirectionalCipher::new(keys(1)),
    );
    (client, server)
}

// ---------------------------------------------------------------------------
// Plain frame codec
// ---------------------------------------------------------------------------

fn bench_plain_codec(c: &mut Criterion) {
    let sizes: &[usize] = &[64, 1024, 8192, 65_535];

    let mut group = c.benchmark_group("plain_encode");
    for &size in sizes {
        let payload = vec![0xABu8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}B")),
            &payload,
            |b, p| {
                b.iter(|| {
                    let mut buf = BytesMut::with_capacity(p.len() + 2);
                    encode_plain(black_box(p), &mut buf).unwrap();
                    black_box(buf);
                });
            },
        );
    }
    group.finish();

    let mut group = c.benchmark_group("plain_decode");
    for &size in sizes {
        let mut encoded = BytesMut::new();
        encode_plain(&vec![0xABu8; size], &mut encoded).unwrap();
        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}B")),
            &encoded,
            |b, data| {
                b.iter(|| {
                    let mut src = data.clone();
                    black_box(decode_plain(black_box(&mut src)).unwrap());
                });
            },
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Encrypted round trip
// ---------------------------------------------------------------------------

fn bench_encrypted_roundtrip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let sizes: &[usize] = &[64, 1024, 16 * 1024, 65_535];

    let mut group = c.benchmark_group("encrypted_roundtrip");
    for &size in sizes {
        let payload = vec![0x5Au8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}B")),
            &payload,
            |b, p| {
                b.to_async(&rt).iter_custom(|iters| {
                    let p = p.clone();
                    async move {
                        let (mut client, mut server) = encrypted_pair();
                        let start = Instant::now();
                        for _ in 0..iters {
                            client.send_frame(Command::StreamChunk, &p).await.unwrap();
                            black_box(server.receive_frame().await.unwrap());
                        }
                        start.elapsed()
                    }
                });
            },
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Session authentication
// ---------------------------------------------------------------------------

fn bench_session_authenticate(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("session_authenticate", |b| {
        b.to_async(&rt).iter(|| async {
            let (a, ap_side) = duplex(64 * 1024);
            let creds = Credentials::password("bench-user", b"bench-secret".to_vec(), "bench-device");
            let mut session = SessionController::new(SessionConfig::default(), creds).unwrap();
            session.connect(PlainTransport::new(a, IO_TIMEOUT)).unwrap();

            let ap = tokio::spawn(async move {
                let mut plain = PlainTransport::new(ap_side, IO_TIMEOUT);
                let mut responder = Responder::new();
                let hello = plain.read_frame().await.unwrap();
                plain
                    .write_frame(&responder.process_hello(&hello).unwrap())
                    .await
                    .unwrap();
                let login = plain.read_frame().await.unwrap();
                responder.process_login(&login).unwrap();
                let welcome = Welcome {
                    canonical_identity: "bench-user".into(),
                    reusable_credential_kind: CredentialKind::StoredToken,
                    reusable_credential: vec![0x77; 64],
                    country_code: "SE".into(),
                };
                let accepted = responder.accept(&welcome).unwrap();
                plain.write_frame(&accepted.reply).await.unwrap();
            });

            black_box(session.authenticate().await.unwrap());
            ap.await.unwrap();
        });
    });
}

// ---------------------------------------------------------------------------
// Criterion harness
// ---------------------------------------------------------------------------

criterion_group! {
    name = transport_benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(5));
    targets =
        bench_plain_codec,
        bench_encrypted_roundtrip,
        bench_session_authenticate
}

criterion_main!(transport_benches);
