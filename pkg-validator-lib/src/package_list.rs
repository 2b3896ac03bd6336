//! Package list files.
//!
//! A package list is a JSON array of absolute repository URLs. Array order is the
//! stored order. Lists are written pretty-printed with `/` left unescaped so
//! diffs stay readable.

use crate::Result;
use crate::urls::PackageUrl;
use core::time::Duration;
use ohno::IntoAppError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

const LOG_TARGET: &str = "      list";

/// Read a package list file.
pub fn load(path: &Path) -> Result<Vec<PackageUrl>> {
    let text = fs::read_to_string(path).into_app_err_with(|| format!("reading package list '{}'", path.display()))?;
    let urls: Vec<PackageUrl> = serde_json::from_str(&text).into_app_err_with(|| format!("parsing package list '{}'", path.display()))?;

    log::debug!(target: LOG_TARGET, "Loaded {} packages from '{}'", urls.len(), path.display());
    Ok(urls)
}

/// The list as it is stored on disk.
pub fn to_json(urls: &[PackageUrl]) -> Result<String> {
    let mut json = serde_json::to_string_pretty(urls).into_app_err("serializing package list")?;
    json.push('\n');
    Ok(json)
}

/// Write a package list file, replacing any existing one.
pub fn save(path: &Path, urls: &[PackageUrl]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).into_app_err_with(|| format!("creating directory '{}'", parent.display()))?;
    }

    fs::write(path, to_json(urls)?).into_app_err_with(|| format!("writing package list '{}'", path.display()))?;

    log::debug!(target: LOG_TARGET, "Saved {} packages to '{}'", urls.len(), path.display());
    Ok(())
}

#[derive(Debug, Deserialize)]
struct DeniedPackage {
    package_url: String,
}

/// Read a deny list: a JSON array of `{ "package_url": "..." }` objects.
///
/// An entry that isn't a valid package URL is an error for the whole file.
pub fn load_deny_list(path: &Path) -> Result<Vec<PackageUrl>> {
    let text = fs::read_to_string(path).into_app_err_with(|| format!("reading deny list '{}'", path.display()))?;
    let entries: Vec<DeniedPackage> = serde_json::from_str(&text).into_app_err_with(|| format!("parsing deny list '{}'", path.display()))?;

    entries
        .into_iter()
        .map(|entry| {
            PackageUrl::parse(&entry.package_url).into_app_err_with(|| format!("invalid URL in deny list '{}'", path.display()))
        })
        .collect()
}

/// Download the canonical package list.
pub async fn fetch(url: &str, timeout: Duration) -> Result<Vec<PackageUrl>> {
    log::info!(target: LOG_TARGET, "Downloading package list from '{url}'");

    let client = reqwest::Client::builder().user_agent("pkg-validator").timeout(timeout).build()?;
    let response = client
        .get(url)
        .send()
        .await
        .into_app_err_with(|| format!("downloading package list from '{url}'"))?
        .error_for_status()
        .into_app_err_with(|| format!("downloading package list from '{url}'"))?;

    let bytes = response
        .bytes()
        .await
        .into_app_err_with(|| format!("reading package list from '{url}'"))?;

    serde_json::from_slice(&bytes).into_app_err_with(|| format!("parsing package list from '{url}'"))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn urls(list: &[&str]) -> Vec<PackageUrl> {
        list.iter().map(|s| PackageUrl::parse(s).unwrap()).collect()
    }

    #[test]
    fn test_to_json_does_not_escape_slashes() {
        let json = to_json(&urls(&["https://github.com/Foo/Bar.git", "https://github.com/a/b.git"])).unwrap();
        assert_eq!(json, "[\n  \"https://github.com/Foo/Bar.git\",\n  \"https://github.com/a/b.git\"\n]\n");
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("packages.json");
        let list = urls(&["https://github.com/Foo/Bar.git", "https://github.com/a/b"]);

        save(&path, &list).unwrap();
        assert_eq!(load(&path).unwrap(), list);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_load_rejects_invalid_urls() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("packages.json");
        fs::write(&path, r#"["https://github.com/foo/bar.git", "not a url"]"#).unwrap();

        let _ = load(&path).unwrap_err();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_load_deny_list() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("denylist.json");
        fs::write(
            &path,
            r#"[{ "package_url": "https://github.com/foo/bar" }, { "package_url": "https://github.com/baz/qux.git", "reason": "spam" }]"#,
        )
        .unwrap();

        assert_eq!(
            load_deny_list(&path).unwrap(),
            urls(&["https://github.com/foo/bar", "https://github.com/baz/qux.git"])
        );
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_load_deny_list_rejects_malformed_url() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("denylist.json");
        fs::write(&path, r#"[{ "package_url": "::nope::" }]"#).unwrap();

        let err = load_deny_list(&path).unwrap_err();
        assert!(err.to_string().contains("deny list"), "{err}");
    }
}
