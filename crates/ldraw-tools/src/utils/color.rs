use std::ffi::OsStr;

/// Colour is off when `--no-color` is given or `NO_COLOR` holds any
/// non-empty value.
fn disabled(flag: bool, no_color: Option<&OsStr>) -> bool {
    flag || no_color.is_some_and(|v| !v.is_empty())
}

/// Applies the colour choice to everything printed through `colored`.
/// Tables follow it through [`crate::utils::format::table`].
pub fn configure(no_color_flag: bool) {
    if disabled(no_color_flag, std::env::var_os("NO_COLOR").as_deref()) {
        colored::control::set_override(false);
    }
}

pub fn enabled() -> bool {
    colored::control::SHOULD_COLORIZE.should_colorize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_or_non_empty_env_disables() {
        assert!(!disabled(false, None));
        assert!(!disabled(false, Some(OsStr::new(""))));
        assert!(disabled(false, Some(OsStr::new("1"))));
        assert!(disabled(true, None));
    }
}
