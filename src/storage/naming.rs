//! File naming for persisted media and failure records

use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;

/// Characters that are unsafe in file names on at least one common filesystem
#[allow(clippy::unwrap_used)] // literal pattern
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).unwrap());

/// Length of generated names for items without a file name
const RANDOM_NAME_LEN: usize = 10;

/// Replace path separators and other unsafe characters with `_`
///
/// Leading dots are stripped so a name can never be `..` or a hidden file.
///
/// ```
/// use media_dumper::storage::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("Trip 2020/21"), "Trip 2020_21");
/// assert_eq!(sanitize_file_name("../etc"), "_etc");
/// ```
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned = UNSAFE_CHARS.replace_all(name.trim(), "_");
    cleaned.trim_start_matches('.').to_string()
}

/// Last path segment of `url`, percent-decoded and sanitized
///
/// Returns `None` when the URL cannot be parsed or its last segment has no
/// extension (CDN URLs like `/photo?id=1` carry nothing useful).
///
/// ```
/// use media_dumper::storage::url_basename;
///
/// assert_eq!(
///     url_basename("https://cdn.example.com/c1/x%20y.jpg?size=max").as_deref(),
///     Some("x y.jpg")
/// );
/// assert_eq!(url_basename("https://cdn.example.com/photo"), None);
/// ```
pub fn url_basename(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(segment).ok()?;
    let name = sanitize_file_name(&decoded);
    let (stem, extension) = name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(name)
}

/// Name a fetched file is persisted under: `<url-basename>_<file_name>`
///
/// The remote basename keeps two items with the same capture time apart. When the
/// item has no generated file name a random `.jpg` name is used.
pub fn destination_file_name(url: &str, file_name: &str) -> String {
    let file_name = match sanitize_file_name(file_name) {
        name if name.is_empty() => random_file_name(),
        name => name,
    };
    match url_basename(url) {
        Some(base) => format!("{}_{}", base, file_name),
        None => file_name,
    }
}

/// Name of the sidecar failure record for an item found at `source_url`
///
/// A source URL without a usable final segment gets a random
/// `failed_<letters>.txt` name so records never overwrite each other.
///
/// ```
/// use media_dumper::storage::failure_record_name;
///
/// assert_eq!(
///     failure_record_name("https://vk.com/photo123_456"),
///     "photo123_456.txt"
/// );
/// ```
pub fn failure_record_name(source_url: &str) -> String {
    let last = source_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    match sanitize_file_name(last) {
        name if name.is_empty() => format!("failed_{}.txt", random_stem()),
        name => format!("{}.txt", name),
    }
}

fn random_file_name() -> String {
    format!("{}.jpg", random_stem())
}

fn random_stem() -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    (0..RANDOM_NAME_LEN)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}
