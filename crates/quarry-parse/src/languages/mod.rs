pub(crate) mod generic;
pub(crate) mod python;
pub(crate) mod typescript;

use quarry_core::truncate_chars;

use crate::parser::EXCERPT_MAX_CHARS;

pub(crate) fn excerpt(text: &str) -> String {
    truncate_chars(text, EXCERPT_MAX_CHARS).to_owned()
}

pub(crate) fn push_unique(values: &mut Vec<String>, value: String) {
    if !value.is_empty() && !values.contains(&value) {
        values.push(value);
    }
}
