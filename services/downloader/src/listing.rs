//! Directory index scraping.
//!
//! The model servers publish plain Apache-style HTML indexes. Only the
//! `href` attributes matter: run folders (`00/`, `12/`), lead folders
//! (`000/`, `003/`, ...) and the `.grib2` files inside them.

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Url;
use tracing::debug;

/// Every `href` attribute of an `<a>` tag in `html`, in document order.
///
/// Indexes are HTML rather than XML, so end tags are not matched and
/// attributes may be unquoted. Parsing stops at the first malformed tag and
/// keeps the links read so far.
pub fn parse_hrefs(html: &str) -> Vec<String> {
    let mut reader = Reader::from_str(html);
    reader.trim_text(true);
    reader.check_end_names(false);

    let mut hrefs = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.name().as_ref().eq_ignore_ascii_case(b"a") {
                    hrefs.extend(href_of(&e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!(position = reader.buffer_position(), error = %e, "Stopped parsing index");
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    hrefs
}

fn href_of(tag: &BytesStart) -> Option<String> {
    tag.html_attributes()
        .with_checks(false)
        .flatten()
        .find(|attr| attr.key.as_ref().eq_ignore_ascii_case(b"href"))
        .map(|attr| match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        })
        .filter(|href| !href.is_empty())
}

/// Sub-folders of an index whose name starts with a digit.
pub fn cycle_folders(html: &str) -> Vec<String> {
    parse_hrefs(html)
        .into_iter()
        .filter(|href| href.starts_with(|c: char| c.is_ascii_digit()))
        .collect()
}

/// `.grib2` links whose name contains `pattern`.
pub fn grib_links(html: &str, pattern: &str) -> Vec<String> {
    parse_hrefs(html)
        .into_iter()
        .filter(|href| href.ends_with(".grib2") && href.contains(pattern))
        .collect()
}

/// Parse `url` as a directory, so relative links resolve inside it.
pub fn directory_url(url: &str) -> Result<Url> {
    let url = if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    };
    Url::parse(&url).with_context(|| format!("Invalid URL: {}", url))
}

/// Resolve an index link against its folder.
pub fn resolve_link(folder: &Url, href: &str) -> Result<Url> {
    folder
        .join(href)
        .with_context(|| format!("Invalid link '{}' in {}", href, folder))
}

/// Last path segment of a URL.
pub fn file_name(url: &Url) -> Option<&str> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN_INDEX: &str = r#"<!DOCTYPE HTML PUBLIC "-//W3C//DTD HTML 3.2 Final//EN">
<html>
 <head><title>Index of /model_gem_global/25km/grib2/lat_lon/00</title></head>
 <body>
<h1>Index of /model_gem_global/25km/grib2/lat_lon/00</h1>
<pre><a href="?C=N;O=D">Name</a>  <a href="?C=M;O=A">Last modified</a>
<hr><a href="/model_gem_global/25km/grib2/lat_lon/">Parent Directory</a>
<a href="000/">000/</a>     2024-01-01 03:41    -
<a href="003/">003/</a>     2024-01-01 03:42    -
<A HREF = '006/'>006/</A>   2024-01-01 03:43    -
</pre></body></html>"#;

    const LEAD_INDEX: &str = r#"<pre>
<a href="CMC_glb_DSWRF_SFC_0_latlon.24x.24_2024010100_P003.grib2">CMC_glb_DSWRF_SFC_0_latlon.24x.24_2024010100_P003.grib2</a>
<a href="CMC_glb_TMP_ISBL_500_latlon.24x.24_2024010100_P003.grib2">CMC_glb_TMP_ISBL_500_latlon.24x.24_2024010100_P003.grib2</a>
<a href="CMC_glb_TMP_ISBL_850_latlon.24x.24_2024010100_P003.grib2">CMC_glb_TMP_ISBL_850_latlon.24x.24_2024010100_P003.grib2</a>
<a href="CMC_glb_TMP_ISBL_850_latlon.24x.24_2024010100_P003.grib2.idx">idx</a>
<a href=CMC_glb_WIND_TGL_10_latlon.24x.24_2024010100_P003.grib2>wind</a>
</pre>"#;

    #[test]
    fn test_parse_hrefs() {
        let hrefs = parse_hrefs(RUN_INDEX);
        assert_eq!(
            hrefs,
            vec![
                "?C=N;O=D",
                "?C=M;O=A",
                "/model_gem_global/25km/grib2/lat_lon/",
                "000/",
                "003/",
                "006/",
            ]
        );
    }

    #[test]
    fn test_cycle_folders_start_with_digit() {
        assert_eq!(cycle_folders(RUN_INDEX), vec!["000/", "003/", "006/"]);
        assert!(cycle_folders("<p>no links</p>").is_empty());
    }

    #[test]
    fn test_grib_links_match_pattern() {
        let links = grib_links(LEAD_INDEX, "TMP_ISBL");
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.contains("TMP_ISBL") && l.ends_with(".grib2")));

        assert_eq!(
            grib_links(LEAD_INDEX, "WIND_TGL"),
            vec!["CMC_glb_WIND_TGL_10_latlon.24x.24_2024010100_P003.grib2"]
        );
        assert!(grib_links(LEAD_INDEX, "TCDC_SFC").is_empty());
    }

    #[test]
    fn test_unterminated_attribute_is_ignored() {
        assert_eq!(parse_hrefs(r#"<a href="001/">x</a><a href="00"#), vec!["001/"]);
        assert!(parse_hrefs("<a href>").is_empty());
    }

    #[test]
    fn test_only_anchor_links_are_read() {
        let html = r#"<link rel="stylesheet" href="/icons/style.css">
<p>see href="not-a-link/" in text</p>
<a class='dir' href="009/" title="009">009/</a><a name="top"></a>
<a href="x.grib2?a=1&amp;b=2">x</a>"#;
        assert_eq!(parse_hrefs(html), vec!["009/", "x.grib2?a=1&b=2"]);
    }

    #[test]
    fn test_resolve_links() {
        let run = directory_url("https://dd.example.org/lat_lon/00").unwrap();
        assert_eq!(run.as_str(), "https://dd.example.org/lat_lon/00/");

        let folder = resolve_link(&run, "003/").unwrap();
        assert_eq!(folder.as_str(), "https://dd.example.org/lat_lon/00/003/");

        let file = resolve_link(&folder, "CMC_glb_TMP_ISBL_500_P003.grib2").unwrap();
        assert_eq!(file_name(&file), Some("CMC_glb_TMP_ISBL_500_P003.grib2"));
        assert_eq!(file_name(&folder), None);
    }
}
