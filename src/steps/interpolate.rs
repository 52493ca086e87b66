use crate::engine::types::Context;
use crate::expr::lookup;

/// Replace `${key}` and `${nested.key}` placeholders with context values.
/// Unknown keys render as the empty string; an unclosed `${` is left as is.
pub fn interpolate(template: &str, ctx: &Context) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("${") {
        let Some(len) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);

        let path = rest[open + 2..open + len].trim();
        match lookup(ctx, path) {
            Some(serde_json::Value::String(s)) => out.push_str(s),
            Some(serde_json::Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }

        rest = &rest[open + len + 1..];
    }

    out.push_str(rest);
    out
}
