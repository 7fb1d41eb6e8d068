//! Feature negotiation: decides, per compilation, whether typed
//! declarations are emitted, how decoded `bytes` relate to the input
//! buffer, and when encoding verifies its input.

use std::fmt;

use log::warn;

/// When the generated `encode_msg` verifies its input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VerifyMode {
    /// Encoding always verifies first.
    Always,
    /// Encoding accepts a per-call switch ([`EncodeOpts::verify`]).
    ///
    /// [`EncodeOpts::verify`]: crate::EncodeOpts
    #[default]
    Optionally,
    /// Encoding never verifies. `verify_msg` itself is still emitted and
    /// always active when called directly.
    Never,
}

/// Whether a decoded `bytes` value aliases the input buffer or copies out
/// of it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CopyBytes {
    /// Alias the input buffer.
    Never,
    /// Copy into a fresh buffer.
    Always,
    /// Resolved at generation time; the `bytes::Bytes` runtime always
    /// supports an efficient owned copy, so this becomes `Always`.
    #[default]
    Auto,
    /// Copy only when the whole input buffer is at least this many times
    /// longer than the slice, so a small field cannot pin a large buffer.
    Threshold(u32),
}

/// The negotiated feature set a codec is synthesized under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Features {
    pub type_specs: bool,
    pub copy_bytes: CopyBytes,
    pub verify: VerifyMode,
}

impl Default for Features {
    fn default() -> Features {
        Features {
            type_specs: false,
            copy_bytes: CopyBytes::Auto,
            verify: VerifyMode::Optionally,
        }
    }
}

/// A non-fatal condition surfaced to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Warning {
    /// The message graph has a reference cycle, so typed declarations
    /// were disabled: a cyclic schema cannot be declared as plain unboxed
    /// structs.
    TypeSpecsDisabled,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::TypeSpecsDisabled => f.write_str(
                "message graph contains a reference cycle; typed declarations are disabled",
            ),
        }
    }
}

pub(crate) fn negotiate(
    type_specs: bool,
    copy_bytes: CopyBytes,
    verify: VerifyMode,
    cyclic: bool,
) -> (Features, Vec<Warning>) {
    let mut warnings = Vec::new();
    let type_specs = if type_specs && cyclic {
        warn!("{}", Warning::TypeSpecsDisabled);
        warnings.push(Warning::TypeSpecsDisabled);
        false
    } else {
        type_specs
    };

    let copy_bytes = match copy_bytes {
        CopyBytes::Auto => CopyBytes::Always,
        other => other,
    };

    (
        Features {
            type_specs,
            copy_bytes,
            verify,
        },
        warnings,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_demotes_type_specs_with_a_warning() {
        let (features, warnings) = negotiate(true, CopyBytes::Never, VerifyMode::Always, true);
        assert!(!features.type_specs);
        assert_eq!(warnings, [Warning::TypeSpecsDisabled]);

        let (features, warnings) = negotiate(true, CopyBytes::Never, VerifyMode::Always, false);
        assert!(features.type_specs);
        assert!(warnings.is_empty());
    }

    #[test]
    fn auto_copy_resolves_to_always() {
        let (features, _) = negotiate(false, CopyBytes::Auto, VerifyMode::Never, false);
        assert_eq!(features.copy_bytes, CopyBytes::Always);
        let (features, _) = negotiate(false, CopyBytes::Threshold(16), VerifyMode::Never, false);
        assert_eq!(features.copy_bytes, CopyBytes::Threshold(16));
    }
}
