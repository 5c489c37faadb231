use url::Url;

use crate::DashResult;

pub(crate) fn is_absolute_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}

pub(crate) fn merge_baseurls(current: &Url, new: &str) -> DashResult<Url> {
    if is_absolute_url(new) {
        Ok(Url::parse(new)?)
    } else {
        // Merge the query portion of the current URL (the manifest URL or an
        // accumulated BaseURL) into the joined result. A query string on the
        // new URL takes precedence.
        let mut merged = current.join(new)?;
        if merged.query().is_none() {
            merged.set_query(current.query());
        }
        Ok(merged)
    }
}

/// The directory of the MPD document URL. A BaseURL element with empty text
/// inherits this.
pub(crate) fn document_base(manifest_url: &Url) -> DashResult<Url> {
    Ok(manifest_url.join(".")?)
}
