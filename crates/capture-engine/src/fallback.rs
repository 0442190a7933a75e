//! Ordered candidate selection.

/// The candidate that worked, and what it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected<C, T> {
    pub candidate: C,
    pub value: T,
}

/// Every candidate was tried and none worked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no candidate succeeded (tried: {})", attempted.join(", "))]
pub struct FallbackError {
    pub attempted: Vec<String>,
}

/// Try `candidates` in order and return the first one `attempt` accepts.
///
/// Later candidates are not tried once one succeeds.
pub fn first_success<C, T, I, F>(candidates: I, mut attempt: F) -> Result<Selected<C, T>, FallbackError>
where
    I: IntoIterator<Item = C>,
    C: AsRef<str>,
    F: FnMut(&C) -> Option<T>,
{
    let mut attempted = Vec::new();
    for candidate in candidates {
        match attempt(&candidate) {
            Some(value) => {
                tracing::debug!(
                    candidate = candidate.as_ref(),
                    skipped = attempted.len(),
                    "Candidate accepted"
                );
                return Ok(Selected { candidate, value });
            }
            None => {
                tracing::debug!(candidate = candidate.as_ref(), "Candidate rejected");
                attempted.push(candidate.as_ref().to_string());
            }
        }
    }
    Err(FallbackError { attempted })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_working_candidate_wins() {
        let mut tried = Vec::new();
        let selected = first_success(["x264enc", "nvh264enc", "amfh264enc"], |c| {
            tried.push(c.to_string());
            (*c != "x264enc").then_some(c.len())
        })
        .unwrap();
        assert_eq!(selected.candidate, "nvh264enc");
        assert_eq!(selected.value, "nvh264enc".len());
        assert_eq!(tried, vec!["x264enc", "nvh264enc"]);
    }

    #[test]
    fn all_failures_are_reported_in_order() {
        let err = first_success(["a", "b", "c"], |_| None::<()>).unwrap_err();
        assert_eq!(err.attempted, vec!["a", "b", "c"]);
        assert_eq!(err.to_string(), "no candidate succeeded (tried: a, b, c)");
    }

    #[test]
    fn empty_candidate_list_fails() {
        let err = first_success(Vec::<String>::new(), |_| Some(1)).unwrap_err();
        assert!(err.attempted.is_empty());
    }
}
