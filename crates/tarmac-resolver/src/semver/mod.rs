//! Range matching over published version lists.
//!
//! The gateway does not re-implement semver; parsing and matching are
//! delegated to the `semver` crate. Specifiers that crate cannot parse
//! (e.g. `||` unions) simply match nothing.

use semver::{Version, VersionReq};

/// The highest published version satisfying `range`, if any.
///
/// Versions that do not parse as semver are skipped; the result is always
/// a member of `versions`.
pub fn max_satisfying<'a, I>(versions: I, range: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let req = VersionReq::parse(range).ok()?;

    versions
        .into_iter()
        .filter_map(|raw| Version::parse(raw).ok().map(|parsed| (parsed, raw)))
        .filter(|(parsed, _)| req.matches(parsed))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, raw)| raw.to_string())
}
