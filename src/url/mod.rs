//! URL handling module for obs-harvest
//!
//! This module builds listing page URLs and resolves site-relative links
//! against the configured base URL.

use url::Url;

/// Query parameter carrying the listing page number
pub const PAGE_PARAM: &str = "page";

/// Builds the URL of listing page `page` from a seed listing URL
///
/// Any `page` parameter already present on the seed is replaced; every other
/// query pair is kept in its original order.
///
/// # Examples
///
/// ```
/// use obs_harvest::url::listing_page_url;
/// use url::Url;
///
/// let seed = Url::parse("https://waarnemingen.be/species/1/photos/?date_after=2022-01-01").unwrap();
/// assert_eq!(
///     listing_page_url(&seed, 3).as_str(),
///     "https://waarnemingen.be/species/1/photos/?date_after=2022-01-01&page=3"
/// );
/// ```
pub fn listing_page_url(seed: &Url, page: u32) -> Url {
    let kept: Vec<(String, String)> = seed
        .query_pairs()
        .filter(|(key, _)| key != PAGE_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = seed.clone();
    url.set_query(None);
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(PAGE_PARAM, &page.to_string());
    }
    url
}

/// Resolves a site-relative link against the base URL
pub fn resolve_link(base: &Url, link: &str) -> Result<Url, url::ParseError> {
    base.join(link.trim())
}

/// Returns true if an anchor href names a harvestable resource
///
/// Only site-relative paths under `prefix` qualify; absolute URLs, fragments
/// and the bare prefix itself are rejected.
pub fn is_candidate_link(href: &str, prefix: &str) -> bool {
    let href = href.trim();
    href.len() > prefix.len() && href.starts_with(prefix) && !href.starts_with("//")
}
