//! Root requirement fingerprints

use shelf_core::types::Dependency;
use shelf_core::utils::blake3_fields;

/// Leading field, changed whenever normalization changes
const FINGERPRINT_SCHEME: &str = "shelf-roots-v1";

/// Hash of the normalized root list
///
/// Roots are ordered by name, then constraints, then location, and each
/// constraint set by canonical text, so neither declaration order nor
/// constraint spelling (`1.0` vs `=1.0`) changes the result. Credentials
/// never take part.
pub fn fingerprint(roots: &[Dependency]) -> String {
    let mut normalized: Vec<(String, Vec<String>, String)> = roots
        .iter()
        .map(|root| {
            (
                root.name.clone(),
                root.constraints.sorted_strings(),
                root.location.as_ref().map(|l| l.descriptor()).unwrap_or_default(),
            )
        })
        .collect();
    normalized.sort();

    let mut fields = vec![FINGERPRINT_SCHEME.to_string()];
    for (name, constraints, location) in normalized {
        fields.push(name);
        fields.push(constraints.len().to_string());
        fields.extend(constraints);
        fields.push(location);
    }

    blake3_fields(fields)
}
