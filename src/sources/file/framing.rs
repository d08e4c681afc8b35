// SPDX-License-Identifier: Apache-2.0

//! Consistency checks for multi-line framing options.

use regex::Regex;

use crate::sources::file::config::{MultiLineMode, MultiLineOptions};
use crate::sources::file::error::{Error, Result};

/// Validate multi-line options before a reader is built from them.
///
/// `prefix` and `garbage` are only read by the regex based modes
/// (prefix-garbage and prefix-suffix). Setting them with any other mode is an
/// error rather than being silently ignored. The regex modes need a valid
/// prefix pattern, and the garbage/suffix pattern must compile if present.
pub fn validate_multi_line(options: &MultiLineOptions) -> Result<()> {
    if !options.mode.uses_patterns() {
        if options.prefix().is_some() || options.garbage().is_some() {
            return Err(Error::Framing(
                "multi-line-prefix() and/or multi-line-garbage() specified but multi-line-mode() is not regexp based (prefix-garbage or prefix-suffix), please set multi-line-mode() properly"
                    .to_string(),
            ));
        }
        return Ok(());
    }

    let Some(prefix) = options.prefix() else {
        return Err(Error::Framing(format!(
            "multi-line-mode({}) requires multi-line-prefix() to be set",
            options.mode
        )));
    };
    compile("multi-line-prefix", prefix)?;

    if let Some(garbage) = options.garbage() {
        let option = match options.mode {
            MultiLineMode::PrefixSuffix => "multi-line-suffix",
            _ => "multi-line-garbage",
        };
        compile(option, garbage)?;
    }

    Ok(())
}

fn compile(option: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::Framing(format!("invalid {}() pattern '{}': {}", option, pattern, e)))
}
