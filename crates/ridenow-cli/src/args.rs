use anyhow::{bail, Result};

/// Command-line arguments after the program name: positionals in order,
/// plus `--flag value` pairs.
#[derive(Debug, Default)]
pub struct Args {
    positionals: Vec<String>,
    flags: Vec<(String, String)>,
    missing_values: Vec<String>,
}

impl Args {
    pub fn from_env() -> Self {
        Self::parse(std::env::args().skip(1))
    }

    pub fn parse(raw: impl IntoIterator<Item = String>) -> Self {
        let mut args = Self::default();
        let mut raw = raw.into_iter().peekable();
        while let Some(arg) = raw.next() {
            match arg.strip_prefix("--") {
                Some(name) if !name.is_empty() => {
                    match raw.next_if(|next| !next.starts_with("--")) {
                        Some(value) => args.flags.push((name.to_string(), value)),
                        None => args.missing_values.push(name.to_string()),
                    }
                }
                _ => args.positionals.push(arg),
            }
        }
        args.positionals.reverse();
        args
    }

    pub fn next_positional(&mut self) -> Option<String> {
        self.positionals.pop()
    }

    pub fn required(&mut self, name: &str) -> Result<String> {
        match self.next_positional() {
            Some(value) => Ok(value),
            None => bail!("Missing <{}>. Run `ridenow help` for usage.", name),
        }
    }

    /// Last value given for `--name`
    pub fn flag(&self, name: &str) -> Result<Option<String>> {
        if self.missing_values.iter().any(|m| m == name) {
            bail!("--{} needs a value", name);
        }
        Ok(self
            .flags
            .iter()
            .rev()
            .find(|(flag, _)| flag == name)
            .map(|(_, value)| value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &[&str]) -> Args {
        Args::parse(raw.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_positionals_in_order() {
        let mut args = parse(&["search", "Pune", "2026-03-01 09:00", "2026-03-02 09:00"]);
        assert_eq!(args.next_positional().as_deref(), Some("search"));
        assert_eq!(args.required("city").expect("city"), "Pune");
        assert_eq!(args.required("pickup").expect("pickup"), "2026-03-01 09:00");
        assert_eq!(args.required("drop").expect("drop"), "2026-03-02 09:00");
        assert!(args.required("extra").is_err());
    }

    #[test]
    fn test_flags() {
        let args = parse(&["profile", "--name", "Asha", "--phone", "98450", "--name", "Asha R"]);
        assert_eq!(args.flag("name").expect("flag").as_deref(), Some("Asha R"));
        assert_eq!(args.flag("phone").expect("flag").as_deref(), Some("98450"));
        assert_eq!(args.flag("dob").expect("flag"), None);
    }

    #[test]
    fn test_flag_without_value() {
        let args = parse(&["profile", "--photo", "--name", "Asha"]);
        assert!(args.flag("photo").is_err());
        assert_eq!(args.flag("name").expect("flag").as_deref(), Some("Asha"));
    }
}
