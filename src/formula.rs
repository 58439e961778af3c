use std::fmt;

use crate::error::AssistantError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Main(String),
    Interaction(String, String),
}

impl Term {
    pub fn variables(&self) -> Vec<&str> {
        match self {
            Term::Main(v) => vec![v.as_str()],
            Term::Interaction(v1, v2) => vec![v1.as_str(), v2.as_str()],
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Main(v) => write!(f, "{v}"),
            Term::Interaction(v1, v2) => write!(f, "{v1}:{v2}"),
        }
    }
}

/// Accepted right-hand sides:
/// - `~ group` intercept + group
/// - `~ 0 + group` / `~ -1 + group` / `~ group - 1` no intercept
/// - `~ group + batch`
/// - `~ 0 + group:batch` cell means of the interaction
/// - `~ group * batch` main effects + interaction
/// - `~ 1` intercept only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    pub intercept: bool,
    pub terms: Vec<Term>,
}

impl Formula {
    pub fn parse(formula: &str) -> Result<Self, AssistantError> {
        let trimmed = formula.trim();
        let rhs = trimmed
            .strip_prefix('~')
            .ok_or_else(|| AssistantError::Formula(format!("'{formula}' must start with '~'")))?
            .trim();
        if rhs.is_empty() {
            return Err(AssistantError::Formula(
                "right-hand side is empty".to_string(),
            ));
        }

        let mut intercept = true;
        let mut terms: Vec<Term> = Vec::new();
        for (position, piece) in rhs.split('+').map(str::trim).enumerate() {
            let mut parts = piece.split('-').map(str::trim);
            let raw = parts.next().unwrap_or("");
            let mut removed = false;
            for subtracted in parts {
                if subtracted != "1" {
                    return Err(AssistantError::Formula(format!(
                        "only '- 1' can be subtracted, got '- {subtracted}'"
                    )));
                }
                intercept = false;
                removed = true;
            }
            if raw.is_empty() {
                if removed {
                    continue;
                }
                return Err(AssistantError::Formula(format!(
                    "empty term in '{formula}'"
                )));
            }
            match raw {
                "1" => continue,
                "0" if position == 0 => {
                    intercept = false;
                    continue;
                }
                "0" => {
                    return Err(AssistantError::Formula(format!(
                        "'{raw}' must be the first term"
                    )));
                }
                _ => {}
            }

            if let Some((left, right)) = raw.split_once('*') {
                let (left, right) = (check_name(left)?, check_name(right)?);
                push_unique(&mut terms, Term::Main(left.to_string()));
                push_unique(&mut terms, Term::Main(right.to_string()));
                push_unique(
                    &mut terms,
                    Term::Interaction(left.to_string(), right.to_string()),
                );
            } else if let Some((left, right)) = raw.split_once(':') {
                let (left, right) = (check_name(left)?, check_name(right)?);
                push_unique(
                    &mut terms,
                    Term::Interaction(left.to_string(), right.to_string()),
                );
            } else {
                push_unique(&mut terms, Term::Main(check_name(raw)?.to_string()));
            }
        }

        if terms.is_empty() && !intercept {
            return Err(AssistantError::Formula(
                "model has no terms".to_string(),
            ));
        }

        Ok(Self { intercept, terms })
    }

    pub fn variables(&self) -> Vec<&str> {
        let mut vars: Vec<&str> = self.terms.iter().flat_map(Term::variables).collect();
        vars.sort_unstable();
        vars.dedup();
        vars
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if !self.intercept {
            parts.push("0".to_string());
        } else if self.terms.is_empty() {
            parts.push("1".to_string());
        }
        parts.extend(self.terms.iter().map(ToString::to_string));
        write!(f, "~ {}", parts.join(" + "))
    }
}

fn check_name(raw: &str) -> Result<&str, AssistantError> {
    let name = raw.trim();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.');
    if !valid {
        return Err(AssistantError::Formula(format!("invalid term '{raw}'")));
    }
    Ok(name)
}

fn push_unique(terms: &mut Vec<Term>, term: Term) {
    if !terms.contains(&term) {
        terms.push(term);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_no_intercept_model() {
        let f = Formula::parse("~ 0 + group").unwrap();
        assert!(!f.intercept);
        assert_eq!(f.terms, vec![Term::Main("group".to_string())]);
        assert_eq!(f.to_string(), "~ 0 + group");
    }

    #[test]
    fn expands_star_into_main_effects_and_interaction() {
        let f = Formula::parse("~ group * batch").unwrap();
        assert!(f.intercept);
        assert_eq!(
            f.terms,
            vec![
                Term::Main("group".to_string()),
                Term::Main("batch".to_string()),
                Term::Interaction("group".to_string(), "batch".to_string()),
            ]
        );
        assert_eq!(f.variables(), vec!["batch", "group"]);
    }

    #[test]
    fn trailing_minus_one_drops_intercept() {
        let f = Formula::parse("~ group - 1").unwrap();
        assert!(!f.intercept);
        assert_eq!(f.terms, vec![Term::Main("group".to_string())]);
        assert_eq!(f, Formula::parse("~ -1 + group").unwrap());

        let two = Formula::parse("~ group + batch - 1").unwrap();
        assert!(!two.intercept);
        assert_eq!(two.to_string(), "~ 0 + group + batch");
    }

    #[test]
    fn intercept_only() {
        let f = Formula::parse("~ 1").unwrap();
        assert!(f.intercept);
        assert!(f.terms.is_empty());
    }

    #[test]
    fn rejects_malformed_formulas() {
        assert!(Formula::parse("group").is_err());
        assert!(Formula::parse("~").is_err());
        assert!(Formula::parse("~ 0").is_err());
        assert!(Formula::parse("~ group + 0").is_err());
        assert!(Formula::parse("~ group +").is_err());
        assert!(Formula::parse("~ log(x)").is_err());
        assert!(Formula::parse("~ group - batch").is_err());
        assert!(Formula::parse("~ group - 1 - 1").is_ok());
    }
}
