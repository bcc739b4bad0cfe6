/// Replace `${ENV_VAR}` placeholders in the raw config text.
///
/// Unresolvable or malformed placeholders are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

/// Implementation with an injectable lookup so tests do not have to mutate
/// the process environment.
fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find('}') {
            Some(end) if end > 0 => {
                let name = &after_open[..end];
                match lookup(name) {
                    Some(value) => result.push_str(&value),
                    None => {
                        result.push_str("${");
                        result.push_str(name);
                        result.push('}');
                    },
                }
                rest = &after_open[end + 1..];
            },
            // "${}" or an unclosed "${…": emit literally and move on.
            _ => {
                result.push_str("${");
                rest = after_open;
            },
        }
    }

    result.push_str(rest);
    result
}
