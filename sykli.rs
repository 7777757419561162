//! Sykli CI pipeline for sco
//!
//! Run locally: sykli run
//! Or: cargo run --bin sykli --features sykli -- --emit | sykli run -

use sykli::{Condition, Pipeline, Template};

fn main() {
    let mut p = Pipeline::new();

    // === RESOURCES ===
    let src = p.dir(".");
    let cargo_registry = p.cache("cargo-registry");
    let cargo_git = p.cache("cargo-git");
    let target_cache = p.cache("target");

    // === TEMPLATE ===
    // Common Rust container configuration
    let rust = Template::new()
        .container("rust:1.85")
        .mount_dir(&src, "/src")
        .mount_cache(&cargo_registry, "/usr/local/cargo/registry")
        .mount_cache(&cargo_git, "/usr/local/cargo/git")
        .mount_cache(&target_cache, "/src/target")
        .workdir("/src");

    // === TASKS ===

    // Test - run all tests
    let _ = p
        .task("test")
        .from(&rust)
        .run("cargo test --all-features")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"]);

    // Lint - run clippy with strict warnings
    let _ = p
        .task("lint")
        .from(&rust)
        .run("cargo clippy --all-targets --all-features -- -D warnings")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"]);

    // Format check - verify code formatting
    let _ = p
        .task("fmt")
        .from(&rust)
        .run("cargo fmt -- --check")
        .inputs(&["**/*.rs"]);

    // Build release binary (depends on test, lint, fmt)
    let _ = p
        .task("build")
        .from(&rust)
        .run("cargo build --release --bin sco")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"])
        .output("binary", "target/release/sco")
        .after(&["test", "lint", "fmt"]);

    // Smoke test: run the binary and hit every listener
    // Only run on push events (not draft PRs)
    let _ = p
        .task("smoke-test")
        .from(&rust)
        .run(
            r#"#!/bin/bash
set -e

SCO_PUBLISH_INTERVAL_SECS=1 RUST_LOG=info ./target/release/sco > /tmp/sco-log.txt 2>&1 &
SCO_PID=$!
sleep 3

check() {
  STATUS=$(curl -s -o /dev/null -w '%{http_code}' "$1")
  if [ "$STATUS" != "$2" ]; then
    echo "ERROR: $1 returned $STATUS, expected $2"
    cat /tmp/sco-log.txt
    kill $SCO_PID || true
    exit 1
  fi
}

check http://127.0.0.1:8081/health/live 200
check http://127.0.0.1:8081/health/ready 200
check http://127.0.0.1:8080/v1/version 200
check http://127.0.0.1:9003/debug/vars 200
check http://127.0.0.1:9001/metrics 200
check http://127.0.0.1:9002/metrics 200

if ! curl -s http://127.0.0.1:9002/metrics | grep -q '^uptime_seconds '; then
  echo "ERROR: prometheus endpoint has no uptime_seconds sample"
  kill $SCO_PID || true
  exit 1
fi

# Graceful shutdown must exit zero
kill -TERM $SCO_PID
wait $SCO_PID

echo "Smoke test passed"
"#,
        )
        .input_from("build", "binary", "/src/target/release/sco")
        .when_cond(Condition::event("push").or(Condition::negate(Condition::branch("*"))))
        .timeout(120);

    p.emit();
}
