use serde_json::Value;

use crate::domain::{Iri, ParentEdge, Term};
use crate::error::PipelineError;

/// Maps one raw listing record into a canonical [`Term`].
///
/// Mapping is defaulting, not validating: every field except `iri` is
/// optional and becomes absent when the source omits it. `mesh_ref` is the
/// subset of `annotation.database_cross_reference` entries containing the
/// substring `MESH`; an absent or empty cross-reference list yields an empty
/// vec, not absence.
pub fn normalize_term(raw: &Value) -> Result<Term, PipelineError> {
    let iri = required_iri(raw)?;

    let synonyms = raw
        .get("synonyms")
        .and_then(Value::as_array)
        .map(|values| collect_strings(values));

    let parent_url = raw
        .get("_links")
        .and_then(|v| v.get("parents"))
        .and_then(|v| v.get("href"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let mesh_ref = raw
        .get("annotation")
        .and_then(|v| v.get("database_cross_reference"))
        .and_then(Value::as_array)
        .map(|refs| {
            refs.iter()
                .filter_map(Value::as_str)
                .filter(|entry| entry.contains("MESH"))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(Term {
        iri,
        label: string_field(raw, "label"),
        short_form: string_field(raw, "short_form"),
        ontology_name: string_field(raw, "ontology_name"),
        synonyms,
        parent_url,
        mesh_ref,
    })
}

/// Maps one raw parent record into a [`ParentEdge`] pointing back at the
/// child term it was resolved for.
pub fn normalize_parent(raw: &Value, child_iri: &Iri) -> Result<ParentEdge, PipelineError> {
    let iri = required_iri(raw)?;

    Ok(ParentEdge {
        iri,
        label: string_field(raw, "label"),
        short_form: string_field(raw, "short_form"),
        ontology_name: string_field(raw, "ontology_name"),
        child_iri: child_iri.clone(),
    })
}

fn required_iri(raw: &Value) -> Result<Iri, PipelineError> {
    raw.get("iri")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::MalformedTerm(raw.to_string()))?
        .parse()
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

fn collect_strings(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn normalize_full_record() {
        let raw = json!({
            "iri": "http://www.ebi.ac.uk/efo/EFO_0000408",
            "label": "disease",
            "short_form": "EFO_0000408",
            "ontology_name": "efo",
            "synonyms": ["disorder", "medical condition"],
            "annotation": {
                "database_cross_reference": ["MESH:D004194", "ICD10:XIV", "MESH:D013568"]
            },
            "_links": {
                "parents": {"href": "http://www.ebi.ac.uk/ols4/api/terms/parents"}
            }
        });

        let term = normalize_term(&raw).unwrap();
        assert_eq!(term.iri.as_str(), "http://www.ebi.ac.uk/efo/EFO_0000408");
        assert_eq!(term.label.as_deref(), Some("disease"));
        assert_eq!(term.short_form.as_deref(), Some("EFO_0000408"));
        assert_eq!(term.ontology_name.as_deref(), Some("efo"));
        assert_eq!(
            term.synonyms.as_deref(),
            Some(&["disorder".to_string(), "medical condition".to_string()][..])
        );
        assert_eq!(
            term.parent_url.as_deref(),
            Some("http://www.ebi.ac.uk/ols4/api/terms/parents")
        );
        assert_eq!(term.mesh_ref, vec!["MESH:D004194", "MESH:D013568"]);
    }

    #[test]
    fn normalize_minimal_record_defaults_optionals() {
        let raw = json!({"iri": "http://www.ebi.ac.uk/efo/EFO_0000001"});

        let term = normalize_term(&raw).unwrap();
        assert_eq!(term.label, None);
        assert_eq!(term.short_form, None);
        assert_eq!(term.ontology_name, None);
        assert_eq!(term.synonyms, None);
        assert_eq!(term.parent_url, None);
        assert!(term.mesh_ref.is_empty());
    }

    #[test]
    fn mesh_filter_on_empty_list() {
        let raw = json!({
            "iri": "http://www.ebi.ac.uk/efo/EFO_0000001",
            "annotation": {"database_cross_reference": []}
        });
        let term = normalize_term(&raw).unwrap();
        assert!(term.mesh_ref.is_empty());
    }

    #[test]
    fn parent_url_absent_at_mid_level() {
        let raw = json!({
            "iri": "http://www.ebi.ac.uk/efo/EFO_0000001",
            "_links": {"self": {"href": "http://x"}}
        });
        let term = normalize_term(&raw).unwrap();
        assert_eq!(term.parent_url, None);
    }

    #[test]
    fn missing_iri_is_malformed() {
        let raw = json!({"label": "orphan"});
        let err = normalize_term(&raw).unwrap_err();
        assert_matches!(err, PipelineError::MalformedTerm(_));
    }

    #[test]
    fn normalize_parent_stamps_child() {
        let child: Iri = "http://www.ebi.ac.uk/efo/EFO_0000408".parse().unwrap();
        let raw = json!({
            "iri": "http://www.ebi.ac.uk/efo/EFO_0000001",
            "label": "experimental factor"
        });

        let edge = normalize_parent(&raw, &child).unwrap();
        assert_eq!(edge.iri.as_str(), "http://www.ebi.ac.uk/efo/EFO_0000001");
        assert_eq!(edge.label.as_deref(), Some("experimental factor"));
        assert_eq!(edge.child_iri, child);
    }
}
