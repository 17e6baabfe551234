//! Runs the W3C JSON-LD expansion tests from a local copy of the
//! `json-ld-api/tests` directory.
//!
//! ```text
//! test_expand path/to/json-ld-api/tests
//! ```
//!
//! Set `RUST_LOG=jsonld_expand=debug` to see remote context loading.

use async_std::path::PathBuf;
use async_std::task;
use jsonld_expand::{expand_document, BoxFuture, DocumentLoader, JsonLdOptions, RemoteDocument};
use serde::Deserialize;
use serde_json::Value;
use std::error::Error;
use std::process;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Deserialize)]
struct Manifest {
    #[serde(rename = "baseIri")]
    base_iri: String,
    sequence: Vec<TestEntry>,
}

#[derive(Deserialize)]
struct TestEntry {
    #[serde(rename = "@id")]
    id: String,

    #[serde(rename = "@type")]
    types: Vec<String>,

    name: String,
    input: String,
    expect: Option<String>,

    #[serde(rename = "expectErrorCode")]
    expect_error_code: Option<String>,

    #[serde(default)]
    option: Value,
}

#[derive(Debug, thiserror::Error)]
enum LoadError {
    #[error("{0} is outside the test suite")]
    Outside(Url),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Serves the test suite's base IRI from the local directory.
struct SuiteLoader {
    base: Url,
    root: PathBuf,
}

impl SuiteLoader {
    async fn read(&self, url: &Url) -> Result<Value, LoadError> {
        let relative = url
            .as_str()
            .strip_prefix(self.base.as_str())
            .ok_or_else(|| LoadError::Outside(url.clone()))?;
        let relative = relative.split('#').next().unwrap_or(relative);

        let text = async_std::fs::read_to_string(self.root.join(relative)).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl DocumentLoader for SuiteLoader {
    type Error = LoadError;

    fn load_document<'a>(
        &'a self,
        url: &'a Url,
    ) -> BoxFuture<'a, Result<RemoteDocument, LoadError>> {
        Box::pin(async move {
            Ok(RemoteDocument {
                document_url: url.clone(),
                context_url: None,
                document: self.read(url).await?,
            })
        })
    }
}

enum Outcome {
    Pass,
    Fail(String),
    Skip,
}

async fn run_test(entry: &TestEntry, loader: &SuiteLoader) -> Result<Outcome, Box<dyn Error>> {
    if entry.option.get("specVersion").and_then(Value::as_str) == Some("json-ld-1.0") {
        return Ok(Outcome::Skip);
    }

    let mut options: JsonLdOptions = serde_json::from_value(entry.option.clone())?;
    if let Some(Value::String(context)) = &options.expand_context {
        options.expand_context = Some(Value::String(loader.base.join(context)?.to_string()));
    }

    let input = loader.base.join(&entry.input)?;
    let result = expand_document(input.as_str(), &options, loader).await;

    let outcome = if entry.types.iter().any(|t| t == "jld:NegativeEvaluationTest") {
        let expected = entry.expect_error_code.as_deref().unwrap_or_default();
        match result {
            Err(err) if err.code.as_str() == expected => Outcome::Pass,
            Err(err) => Outcome::Fail(format!("expected '{}', got {}", expected, err)),
            Ok(value) => Outcome::Fail(format!("expected '{}', got {}", expected, value)),
        }
    } else {
        let expect = match &entry.expect {
            Some(expect) => loader.read(&loader.base.join(expect)?).await?,
            None => return Ok(Outcome::Skip),
        };

        match result {
            Ok(value) if value == expect => Outcome::Pass,
            Ok(value) => Outcome::Fail(format!(
                "expected\n{}\ngot\n{}",
                serde_json::to_string_pretty(&expect)?,
                serde_json::to_string_pretty(&value)?
            )),
            Err(err) => Outcome::Fail(err.to_string()),
        }
    };

    Ok(outcome)
}

async fn run(root: PathBuf) -> Result<bool, Box<dyn Error>> {
    let text = async_std::fs::read_to_string(root.join("expand-manifest.jsonld")).await?;
    let manifest: Manifest = serde_json::from_str(&text)?;
    let loader = SuiteLoader {
        base: Url::parse(&manifest.base_iri)?,
        root,
    };

    let (mut passed, mut failed, mut skipped) = (0, 0, 0);
    for entry in &manifest.sequence {
        match run_test(entry, &loader).await {
            Ok(Outcome::Pass) => passed += 1,
            Ok(Outcome::Skip) => skipped += 1,
            Ok(Outcome::Fail(reason)) => {
                failed += 1;
                println!("FAIL {} {}\n{}\n------", entry.id, entry.name, reason);
            }
            Err(err) => {
                failed += 1;
                println!("FAIL {} {}\nharness error: {}\n------", entry.id, entry.name, err);
            }
        }
    }

    println!("{} passed, {} failed, {} skipped", passed, failed, skipped);
    Ok(failed == 0)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let root = match std::env::args().nth(1) {
        Some(root) => PathBuf::from(root),
        None => {
            eprintln!("usage: test_expand <json-ld-api/tests directory>");
            process::exit(2);
        }
    };

    match task::block_on(run(root)) {
        Ok(true) => (),
        Ok(false) => process::exit(1),
        Err(err) => {
            eprintln!("error: {}", err);
            process::exit(2);
        }
    }
}
