//! Role command templating.
//!
//! Role commands, arguments, environment values, and hook commands may
//! reference a fixed set of placeholders in `{{name}}` form. The data
//! record is closed: exactly five fields exist, and a string referencing
//! anything else is rejected both at config-load time (via [`validate`])
//! and again at render time, so a bad template surfaces before a
//! failover attempt ever depends on it.

/// Placeholder names accepted in templated strings.
pub const FIELD_NAMES: [&str; 5] = [
    "active_identity_pubkey",
    "active_identity_keypair_file",
    "passive_identity_pubkey",
    "passive_identity_keypair_file",
    "self_name",
];

/// Values substituted into role command templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateData {
    pub active_identity_pubkey: String,
    pub active_identity_keypair_file: String,
    pub passive_identity_pubkey: String,
    pub passive_identity_keypair_file: String,
    pub self_name: String,
}

impl TemplateData {
    fn get(&self, name: &str) -> Option<&str> {
        match name {
            "active_identity_pubkey" => Some(&self.active_identity_pubkey),
            "active_identity_keypair_file" => Some(&self.active_identity_keypair_file),
            "passive_identity_pubkey" => Some(&self.passive_identity_pubkey),
            "passive_identity_keypair_file" => Some(&self.passive_identity_keypair_file),
            "self_name" => Some(&self.self_name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder {{{{{name}}}}} in {input:?}")]
    UnknownPlaceholder { name: String, input: String },

    #[error("unterminated placeholder in {0:?}")]
    Unterminated(String),
}

/// Checks that every placeholder in `input` names a known field.
pub fn validate(input: &str) -> Result<(), TemplateError> {
    scan(input, |name| {
        if FIELD_NAMES.contains(&name) {
            Ok(String::new())
        } else {
            Err(())
        }
    })
    .map(|_| ())
}

/// Substitutes placeholders in `input` with values from `data`.
pub fn render(input: &str, data: &TemplateData) -> Result<String, TemplateError> {
    scan(input, |name| match data.get(name) {
        Some(value) => Ok(value.to_string()),
        None => Err(()),
    })
}

/// Walks `input`, replacing each `{{name}}` with `resolve(name)`.
///
/// Text outside placeholders passes through untouched, including single
/// braces.
fn scan(
    input: &str,
    mut resolve: impl FnMut(&str) -> Result<String, ()>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| TemplateError::Unterminated(input.to_string()))?;
        let name = after[..end].trim();
        let value = resolve(name).map_err(|_| TemplateError::UnknownPlaceholder {
            name: name.to_string(),
            input: input.to_string(),
        })?;
        out.push_str(&value);
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> TemplateData {
        TemplateData {
            active_identity_pubkey: "active-pubkey".into(),
            active_identity_keypair_file: "/keys/active.json".into(),
            passive_identity_pubkey: "passive-pubkey".into(),
            passive_identity_keypair_file: "/keys/passive.json".into(),
            self_name: "validator-1".into(),
        }
    }

    #[test]
    fn renders_all_fields() {
        let out = render(
            "{{active_identity_pubkey}} {{active_identity_keypair_file}} \
             {{passive_identity_pubkey}} {{passive_identity_keypair_file}} {{self_name}}",
            &data(),
        )
        .unwrap();
        assert_eq!(
            out,
            "active-pubkey /keys/active.json passive-pubkey /keys/passive.json validator-1"
        );
    }

    #[test]
    fn plain_string_passes_through() {
        assert_eq!(
            render("systemctl restart solana", &data()).unwrap(),
            "systemctl restart solana"
        );
    }

    #[test]
    fn whitespace_inside_braces_tolerated() {
        assert_eq!(render("{{ self_name }}", &data()).unwrap(), "validator-1");
    }

    #[test]
    fn unknown_placeholder_rejected() {
        let err = render("--identity {{identity}}", &data()).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::UnknownPlaceholder { name, .. } if name == "identity"
        ));
    }

    #[test]
    fn unterminated_placeholder_rejected() {
        let err = render("echo {{self_name", &data()).unwrap_err();
        assert!(matches!(err, TemplateError::Unterminated(_)));
    }

    #[test]
    fn single_braces_are_literal() {
        assert_eq!(render("{json: true}", &data()).unwrap(), "{json: true}");
    }

    #[test]
    fn validate_accepts_known_fields() {
        assert!(validate("--identity {{active_identity_keypair_file}}").is_ok());
        assert!(validate("no placeholders at all").is_ok());
    }

    #[test]
    fn validate_rejects_unknown_fields() {
        assert!(validate("{{not_a_field}}").is_err());
        assert!(validate("{{broken").is_err());
    }
}
