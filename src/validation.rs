use crate::error::{AppError, Result};

const MIN_NAME_LEN: usize = 2;
const MAX_NAME_LEN: usize = 50;

fn is_separator(c: char) -> bool {
    matches!(c, '-' | '_')
}

/// Check an instance name against the identity charset.
///
/// Lowercase ASCII letters, digits, `-` and `_`; 2 to 50 characters;
/// no separator at either end.
pub fn validate_instance_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if len < MIN_NAME_LEN {
        return Err(AppError::invalid_name(name, "name is too short"));
    }
    if len > MAX_NAME_LEN {
        return Err(AppError::invalid_name(name, "name is too long"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || is_separator(c))
    {
        return Err(AppError::invalid_name(
            name,
            "only lowercase letters, digits, '-' and '_' are allowed",
        ));
    }
    if name.starts_with(is_separator) || name.ends_with(is_separator) {
        return Err(AppError::invalid_name(
            name,
            "name must not start or end with a separator",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn accepts_valid_names() {
        for name in ["demo-site", "ab", "site_01", "a1b2c3", &"x".repeat(50)] {
            assert!(validate_instance_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_invalid_names() {
        let too_long = "x".repeat(51);
        for name in [
            "",
            "a",
            too_long.as_str(),
            "Demo",
            "demo site",
            "demo.site",
            "-demo",
            "demo_",
            "../etc",
            "démo",
        ] {
            let err = validate_instance_name(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidName, "{name:?}");
        }
    }
}
