//! Renders a [`TypedVariable`] as plain description text (used by the
//! process-variables block, spec §4.2 step 4c).

use exchanger_shared::TypedVariable;

pub fn variable_display_text(value: &TypedVariable) -> String {
    match value {
        TypedVariable::String(s) => s.clone(),
        TypedVariable::Boolean(b) => if *b { "Да" } else { "Нет" }.to_string(),
        TypedVariable::Long(n) => n.to_string(),
        TypedVariable::Double(f) => f.to_string(),
        TypedVariable::Date(dt) => dt.format("%d.%m.%Y").to_string(),
        TypedVariable::Null => "-".to_string(),
        TypedVariable::Json(v) => v.to_string(),
    }
}
