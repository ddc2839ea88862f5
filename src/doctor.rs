//! Index diagnostics for the `doctor` command
//!
//! Walks the same steps as loading an index (manifest, version, language,
//! metadata, scoring module) and reports each one instead of stopping at the
//! first problem.

use anyhow::Result;
use std::sync::Arc;

use crate::cache::constants::RUNTIME_VERSION;
use crate::cache::{ArtifactKind, ArtifactLoader, ArtifactRef, Fetcher, FsFetcher, HttpFetcher};
use crate::manifest::{EntryManifest, LanguageIndex};

pub struct DiagnosticResult {
    pub name: String,
    pub success: bool,
    pub message: String,
    pub critical: bool,
}

impl DiagnosticResult {
    pub fn new(name: &str, success: bool, message: String, critical: bool) -> Self {
        Self {
            name: name.to_string(),
            success,
            message,
            critical,
        }
    }
}

/// Pick a fetcher for a base path given on the command line: URLs go over
/// HTTP, anything else is read from disk
pub fn loader_for(base_path: &str) -> Result<ArtifactLoader> {
    let mut base_path = base_path.to_string();
    if !base_path.ends_with('/') {
        base_path.push('/');
    }

    let fetcher: Arc<dyn Fetcher> =
        if base_path.starts_with("http://") || base_path.starts_with("https://") {
            Arc::new(HttpFetcher::new(None)?)
        } else {
            Arc::new(FsFetcher::new(None))
        };
    Ok(ArtifactLoader::new(base_path, fetcher))
}

pub async fn run_diagnostics(
    loader: &ArtifactLoader,
    language: Option<&str>,
) -> Result<Vec<DiagnosticResult>> {
    let mut results = Vec::new();

    let manifest = match EntryManifest::load(loader).await {
        Ok(manifest) => {
            results.push(DiagnosticResult::new(
                "Entry manifest",
                true,
                format!("{} language(s)", manifest.languages.len()),
                true,
            ));
            manifest
        }
        Err(e) => {
            results.push(DiagnosticResult::new(
                "Entry manifest",
                false,
                e.to_string(),
                true,
            ));
            return Ok(results);
        }
    };

    results.push(check_version(&manifest));

    let index = match manifest.resolve_language(language) {
        Ok((code, index)) => {
            results.push(DiagnosticResult::new(
                "Language",
                true,
                format!("{} ({} pages)", code, index.page_count),
                true,
            ));
            index.clone()
        }
        Err(e) => {
            results.push(DiagnosticResult::new("Language", false, e.to_string(), true));
            return Ok(results);
        }
    };

    results.push(check_metadata(loader, &index).await);
    results.push(check_scoring_module(loader, &index).await);

    Ok(results)
}

fn check_version(manifest: &EntryManifest) -> DiagnosticResult {
    if manifest.version == RUNTIME_VERSION {
        DiagnosticResult::new("Index version", true, manifest.version.clone(), false)
    } else {
        DiagnosticResult::new(
            "Index version",
            false,
            format!(
                "index built with {}, runtime is {}",
                manifest.version, RUNTIME_VERSION
            ),
            false,
        )
    }
}

async fn check_artifact(
    name: &str,
    loader: &ArtifactLoader,
    kind: ArtifactKind,
    key: &str,
) -> DiagnosticResult {
    let artifact = match ArtifactRef::new(kind, key) {
        Ok(artifact) => artifact,
        Err(e) => return DiagnosticResult::new(name, false, e.to_string(), true),
    };

    match loader.load_checked(&artifact).await {
        Ok(bytes) => DiagnosticResult::new(
            name,
            true,
            format!("{} ({} bytes)", loader.location(&artifact), bytes.len()),
            true,
        ),
        Err(e) => DiagnosticResult::new(name, false, e.to_string(), true),
    }
}

async fn check_metadata(loader: &ArtifactLoader, index: &LanguageIndex) -> DiagnosticResult {
    check_artifact("Metadata", loader, ArtifactKind::Metadata, &index.hash).await
}

async fn check_scoring_module(loader: &ArtifactLoader, index: &LanguageIndex) -> DiagnosticResult {
    check_artifact(
        "Scoring module",
        loader,
        ArtifactKind::ScoringModule,
        index.module_language(),
    )
    .await
}

/// Whether any failed check is critical
pub fn has_critical_failures(results: &[DiagnosticResult]) -> bool {
    results.iter().any(|r| !r.success && r.critical)
}

pub fn print_results(base_path: &str, results: &[DiagnosticResult]) {
    println!("🔍 pagefind-runtime doctor: {base_path}\n");

    let mut failed_count = 0;

    for result in results {
        let icon = if result.success { "✅" } else { "❌" };
        println!("{} {}: {}", icon, result.name, result.message);
        if !result.success {
            failed_count += 1;
        }
    }

    if failed_count > 0 {
        println!(
            "\n[ERROR] Doctor found {} issue{}.",
            failed_count,
            if failed_count == 1 { "" } else { "s" }
        );

        for result in results.iter().filter(|r| !r.success) {
            match result.name.as_str() {
                "Entry manifest" => {
                    println!("\nNo readable pagefind-entry.json. Check the base path points at the index directory.");
                }
                "Index version" => {
                    println!("\nThe index was built by a different version. Searches usually still work; rebuild the index if they fail.");
                }
                "Language" => {
                    println!("\nThe manifest lists no language indexes. Rebuild the index.");
                }
                "Metadata" | "Scoring module" => {
                    println!("\n{} is missing or corrupt. Re-upload the whole index directory.", result.name);
                }
                _ => {}
            }
        }
    } else {
        println!("\n✅ All checks passed! The index is ready to search.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SIGNATURE;
    use tempfile::TempDir;

    fn write_index(dir: &std::path::Path, version: &str, module: &[u8]) -> std::io::Result<()> {
        let manifest = format!(
            r#"{{"version":"{version}","languages":{{"en":{{"hash":"en_abc123","wasm":"en","page_count":3}}}}}}"#
        );
        std::fs::write(dir.join("pagefind-entry.json"), manifest)?;

        let mut meta = SIGNATURE.to_vec();
        meta.extend_from_slice(b"meta");
        std::fs::write(dir.join("pagefind.en_abc123.pf_meta"), meta)?;
        std::fs::write(dir.join("wasm.en.pagefind"), module)?;
        Ok(())
    }

    #[tokio::test]
    async fn test_healthy_index() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let mut module = SIGNATURE.to_vec();
        module.extend_from_slice(b"\0asm");
        write_index(temp_dir.path(), RUNTIME_VERSION, &module)?;

        let loader = loader_for(&temp_dir.path().to_string_lossy())?;
        let results = run_diagnostics(&loader, Some("en")).await?;
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.success));
        assert!(!has_critical_failures(&results));
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_module_and_version_skew() -> Result<()> {
        let temp_dir = TempDir::new()?;
        write_index(temp_dir.path(), "0.0.1", b"not signed")?;

        let loader = loader_for(&temp_dir.path().to_string_lossy())?;
        let results = run_diagnostics(&loader, None).await?;

        let version = results.iter().find(|r| r.name == "Index version");
        assert!(version.is_some_and(|r| !r.success && !r.critical));
        let module = results.iter().find(|r| r.name == "Scoring module");
        assert!(module.is_some_and(|r| !r.success));
        assert!(has_critical_failures(&results));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_manifest_stops_early() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let loader = loader_for(&temp_dir.path().to_string_lossy())?;
        let results = run_diagnostics(&loader, None).await?;
        assert_eq!(results.len(), 1);
        assert!(has_critical_failures(&results));
        Ok(())
    }
}
