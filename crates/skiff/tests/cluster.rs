//! End-to-end suite against a real cluster.
//!
//! These tests are ignored by default. To run them locally:
//! - Point your kubeconfig at a cluster allowed to schedule small jobs
//!   in the `default` namespace (or export `SKIFF_KUBECONFIG`)
//! - Build and push an image whose entrypoint runs this compiled test
//!   binary, and export `SKIFF_IMAGE` to its reference
//! - Optionally export `SKIFF_REPORT_PATH` to collect the log report
//! - Run: `cargo test -p skiff --test cluster -- --ignored --nocapture`
//!
//! Inside the scheduled pods the same binary re-runs exactly the enclosing
//! test, so every code path below executes both on the driver and on the
//! pods it schedules.

use std::time::Duration;

use skiff::{ExposeOptions, Harness, JobOptions};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

async fn setup() -> Harness {
    Harness::setup().await.expect("skiff setup")
}

fn flush_report(harness: &Harness) {
    if let Ok(path) = std::env::var("SKIFF_REPORT_PATH") {
        harness.write_report(path).expect("write suite report");
    }
}

#[tokio::test]
#[ignore]
async fn hello_world() {
    let harness = setup().await;

    harness
        .with_job(JobOptions::new("default"), || async {
            println!("hello from the job pod!");
        })
        .await
        .expect("hello world job");

    flush_report(&harness);
}

#[tokio::test]
#[ignore]
async fn connectivity_between_two_jobs() {
    const NAMESPACE: &str = "default";
    const PORT: u16 = 8080;

    let harness = setup().await;
    let (name_tx, name_rx) = oneshot::channel();

    let listener = harness.with_job(
        JobOptions::new(NAMESPACE).with_expose(ExposeOptions {
            name: name_tx,
            port: PORT,
        }),
        || async {
            println!("hello from pod one! waiting for pod two to connect.");
            let listener = TcpListener::bind(("0.0.0.0", PORT)).await.expect("bind");
            let (stream, peer) = listener.accept().await.expect("accept");
            println!("connected {:?} <- {peer}", stream.local_addr());
        },
    );

    let dialer = async {
        let name = name_rx.await.expect("service name");
        let addr = format!("{name}.{NAMESPACE}.svc:{PORT}");
        harness
            .with_job(JobOptions::new(NAMESPACE), move || async move {
                println!("hello from pod two! connecting to pod one.");
                let deadline = tokio::time::Instant::now() + Duration::from_secs(120);
                loop {
                    match TcpStream::connect(addr.as_str()).await {
                        Ok(stream) => {
                            println!("connected {:?} -> {addr}", stream.local_addr());
                            break;
                        }
                        Err(err) if tokio::time::Instant::now() < deadline => {
                            println!("dial {addr}: {err}, retrying");
                            tokio::time::sleep(Duration::from_secs(2)).await;
                        }
                        Err(err) => panic!("dial {addr}: {err}"),
                    }
                }
            })
            .await
    };

    let (first, second) = tokio::join!(listener, dialer);
    first.expect("listener job");
    second.expect("dialer job");

    flush_report(&harness);
}
