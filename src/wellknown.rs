//! Reserved idents and CURIE prefixes the store bootstraps itself with.
//!
//! Grounded directly in `original_source/maggtomic/__init__.py`'s `PREFIX`
//! dict and its handful of fixed ObjectIds (`OID_URIREF`,
//! `GENERATED_AT_TIME`, the `qudt:value`/`vaem:id` attributes used to
//! fabricate structured literals). Those constants are domain knowledge of
//! this store, not configuration, so they live as code rather than in
//! `Config`.

use std::collections::HashMap;
use std::sync::OnceLock;

use time::OffsetDateTime;

use crate::ident::Ident;

/// `spec.md` §3 pins the four reserved idents to `1970-01-01T00:00:0{0,1,2,3}Z`
/// respectively, so that every database that bootstraps from this crate
/// agrees on their value without exchanging anything.
fn reserved_at(offset_seconds: i64) -> Ident {
    Ident::from_instant(OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(offset_seconds))
}

/// The attribute used to intern a URI/CURIE string onto an [`Ident`]. Every
/// other resource name the store is asked to resolve is looked up or
/// asserted against this attribute.
pub fn uri_ref() -> Ident {
    static CELL: OnceLock<Ident> = OnceLock::new();
    *CELL.get_or_init(|| reserved_at(0))
}

/// The attribute every transaction's reifying entity carries: the wall
/// clock instant the transaction was committed at.
pub fn generated_at_time() -> Ident {
    static CELL: OnceLock<Ident> = OnceLock::new();
    *CELL.get_or_init(|| reserved_at(1))
}

/// The attribute carrying a fabricated literal entity's (or a transaction's)
/// decoded shareable id.
pub fn vaem_id() -> Ident {
    static CELL: OnceLock<Ident> = OnceLock::new();
    *CELL.get_or_init(|| reserved_at(2))
}

/// The attribute carrying a fabricated literal entity's underlying scalar
/// value.
pub fn qudt_value() -> Ident {
    static CELL: OnceLock<Ident> = OnceLock::new();
    *CELL.get_or_init(|| reserved_at(3))
}

/// The canonical URI every reserved ident is seeded with at bootstrap
/// (`store::DatomStore::bootstrap`), satisfying S1's "four `uri-ref`
/// datoms" expectation.
pub fn reserved_uris() -> [(Ident, &'static str); 4] {
    [
        (uri_ref(), "http://www.linkedmodel.org/schema/vaem#uriRef"),
        (generated_at_time(), "http://www.w3.org/ns/prov#generatedAtTime"),
        (vaem_id(), "http://www.linkedmodel.org/schema/vaem#id"),
        (qudt_value(), "http://qudt.org/schema/qudt#value"),
    ]
}

/// CURIE prefixes recognised out of the box. `expand`/`compact` consult
/// these before falling back to whatever prefixes the caller supplied.
fn default_prefixes() -> &'static HashMap<&'static str, &'static str> {
    static CELL: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    CELL.get_or_init(|| {
        HashMap::from([
            ("qudt", "http://qudt.org/schema/qudt#"),
            ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
            ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
            ("vaem", "http://www.linkedmodel.org/schema/vaem#"),
            ("prov", "http://www.w3.org/ns/prov#"),
            ("xsd", "http://www.w3.org/2001/XMLSchema#"),
        ])
    })
}

/// Expands a CURIE like `qudt:value` into its full URI using the built-in
/// prefix table, falling through to caller-supplied `extra` prefixes, and
/// finally returning the input unchanged if it isn't a recognised CURIE
/// (e.g. it is already a full URI, or has no prefix at all).
pub fn expand(curie: &str, extra: &HashMap<String, String>) -> String {
    let Some((prefix, local)) = curie.split_once(':') else {
        return curie.to_string();
    };
    if local.starts_with('/') {
        return curie.to_string();
    }
    if let Some(base) = extra.get(prefix) {
        return format!("{base}{local}");
    }
    if let Some(base) = default_prefixes().get(prefix) {
        return format!("{base}{local}");
    }
    curie.to_string()
}

/// Compacts a full URI back into a CURIE when a known prefix's base is a
/// prefix of it, preferring caller-supplied `extra` prefixes over the
/// built-in table so local overrides win.
pub fn compact(uri: &str, extra: &HashMap<String, String>) -> String {
    for (prefix, base) in extra {
        if let Some(local) = uri.strip_prefix(base.as_str()) {
            return format!("{prefix}:{local}");
        }
    }
    for (prefix, base) in default_prefixes() {
        if let Some(local) = uri.strip_prefix(base) {
            return format!("{prefix}:{local}");
        }
    }
    uri.to_string()
}

/// A resource name is only accepted by the resolver once it looks like a
/// URI or CURIE, matching the original implementation's guard against
/// accidentally interning a bare string as a resource. The full-URI branch
/// is `spec.md` §6's accepted syntax, `^[a-z][a-zA-Z0-9_]*://.+`, tightened
/// from `check_uris`' looser `r"[a-z]\w*?://."` regex; the CURIE branch is
/// this crate's generalisation to `prefix:local` forms the original always
/// expanded to a full URI before this check ran.
pub fn looks_like_resource_name(name: &str) -> bool {
    if is_uri(name) {
        return true;
    }
    match name.split_once(':') {
        Some((prefix, local)) => !prefix.is_empty() && !local.is_empty() && !local.starts_with('/'),
        None => false,
    }
}

/// `^[a-z][a-zA-Z0-9_]*://.+`
fn is_uri(name: &str) -> bool {
    let Some((scheme, rest)) = name.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_lowercase() && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !rest.is_empty()
}
