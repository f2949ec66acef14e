use kiln_models::{BaseImageRef, BuildError, BuildStep, Recipe, StartupDirective};
use std::path::Path;

/// Reads and parses a recipe file.
pub fn load_recipe(path: &Path) -> Result<Recipe, BuildError> {
    let text = std::fs::read_to_string(path).map_err(|e| BuildError::Io {
        reason: format!("cannot read recipe {}: {}", path.display(), e),
    })?;
    parse_recipe(&text)
}

/// Parses the line-oriented recipe format:
///
/// ```text
/// FROM python:3.11-slim
/// WORKDIR /app
/// COPY requirements.txt .
/// RUN pip install -r requirements.txt
/// COPY main.py .
/// CMD ["python", "main.py"]
/// ```
///
/// Structural rules: exactly one FROM and it comes first; exactly one CMD and
/// it comes last. CMD takes exec form only (a JSON argument vector) since the
/// recorded directive is never shell-interpreted.
pub fn parse_recipe(text: &str) -> Result<Recipe, BuildError> {
    let mut base: Option<BaseImageRef> = None;
    let mut steps: Vec<BuildStep> = Vec::new();
    let mut startup: Option<StartupDirective> = None;

    for (number, raw_line) in text.lines().enumerate() {
        let line = number + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (keyword, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (trimmed, ""),
        };

        if startup.is_some() {
            return Err(BuildError::InvalidStartupDirective {
                reason: format!("CMD must be the final instruction, found {} at line {}", keyword, line),
            });
        }

        match keyword {
            "FROM" => {
                if base.is_some() {
                    return Err(BuildError::InvalidRecipe {
                        line,
                        reason: "duplicate FROM instruction".to_string(),
                    });
                }
                if !steps.is_empty() {
                    return Err(BuildError::InvalidRecipe {
                        line,
                        reason: "FROM must be the first instruction".to_string(),
                    });
                }
                let parsed = rest.parse::<BaseImageRef>().map_err(|reason| {
                    BuildError::InvalidRecipe { line, reason }
                })?;
                base = Some(parsed);
            }
            "WORKDIR" => {
                require_base(&base, line)?;
                if rest.is_empty() || rest.split_whitespace().count() != 1 {
                    return Err(BuildError::InvalidRecipe {
                        line,
                        reason: "WORKDIR takes exactly one path".to_string(),
                    });
                }
                steps.push(BuildStep::Workdir {
                    path: rest.to_string(),
                });
            }
            "COPY" => {
                require_base(&base, line)?;
                let mut parts: Vec<String> =
                    rest.split_whitespace().map(str::to_string).collect();
                let dest = match parts.pop() {
                    Some(dest) if !parts.is_empty() => dest,
                    _ => {
                        return Err(BuildError::InvalidRecipe {
                            line,
                            reason: "COPY takes one or more sources and a destination"
                                .to_string(),
                        })
                    }
                };
                steps.push(BuildStep::Copy {
                    sources: parts,
                    dest,
                });
            }
            "RUN" => {
                require_base(&base, line)?;
                if rest.is_empty() {
                    return Err(BuildError::InvalidRecipe {
                        line,
                        reason: "RUN takes a command".to_string(),
                    });
                }
                steps.push(BuildStep::Run {
                    command: rest.to_string(),
                });
            }
            "CMD" => {
                require_base(&base, line)?;
                let argv: Vec<String> = serde_json::from_str(rest).map_err(|_| {
                    BuildError::InvalidStartupDirective {
                        reason: format!(
                            "line {}: CMD must use exec form, e.g. CMD [\"python\", \"main.py\"]",
                            line
                        ),
                    }
                })?;
                startup = Some(StartupDirective::new(argv));
            }
            other => {
                return Err(BuildError::InvalidRecipe {
                    line,
                    reason: format!("unknown instruction '{}'", other),
                });
            }
        }
    }

    let base = base.ok_or(BuildError::InvalidRecipe {
        line: 0,
        reason: "recipe declares no FROM instruction".to_string(),
    })?;

    Ok(Recipe {
        base,
        steps,
        startup,
    })
}

fn require_base(base: &Option<BaseImageRef>, line: usize) -> Result<(), BuildError> {
    if base.is_none() {
        return Err(BuildError::InvalidRecipe {
            line,
            reason: "recipe must start with a FROM instruction".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
# build the app image
FROM runtime:slim
WORKDIR /app
COPY reqs.txt .
RUN install reqs.txt
COPY main.py .
CMD ["run", "main.py"]
"#;

    #[test]
    fn test_parse_example_recipe() {
        let recipe = parse_recipe(EXAMPLE).unwrap();
        assert_eq!(recipe.base, BaseImageRef::new("runtime", "slim"));
        assert_eq!(recipe.steps.len(), 4);
        assert_eq!(
            recipe.steps[0],
            BuildStep::Workdir {
                path: "/app".to_string()
            }
        );
        assert_eq!(
            recipe.startup,
            Some(StartupDirective::new(vec![
                "run".to_string(),
                "main.py".to_string()
            ]))
        );
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let recipe = parse_recipe("# hello\n\nFROM a:b\n\n# mid\nCMD [\"x\"]\n").unwrap();
        assert!(recipe.steps.is_empty());
        assert!(recipe.startup.is_some());
    }

    #[test]
    fn test_from_must_come_first() {
        let err = parse_recipe("WORKDIR /app\nFROM a:b\nCMD [\"x\"]\n").unwrap_err();
        assert!(matches!(err, BuildError::InvalidRecipe { line: 1, .. }));
    }

    #[test]
    fn test_duplicate_from_rejected() {
        let err = parse_recipe("FROM a:b\nFROM c:d\nCMD [\"x\"]\n").unwrap_err();
        assert!(matches!(err, BuildError::InvalidRecipe { line: 2, .. }));
    }

    #[test]
    fn test_unknown_instruction_names_line() {
        let err = parse_recipe("FROM a:b\nENTRYPOINT x\n").unwrap_err();
        match err {
            BuildError::InvalidRecipe { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("ENTRYPOINT"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_cmd_must_be_last() {
        let err = parse_recipe("FROM a:b\nCMD [\"x\"]\nRUN echo hi\n").unwrap_err();
        assert_eq!(err.kind(), "InvalidStartupDirectiveError");
    }

    #[test]
    fn test_cmd_shell_form_rejected() {
        let err = parse_recipe("FROM a:b\nCMD python main.py\n").unwrap_err();
        assert_eq!(err.kind(), "InvalidStartupDirectiveError");
    }

    #[test]
    fn test_copy_needs_source_and_dest() {
        let err = parse_recipe("FROM a:b\nCOPY onlyone\nCMD [\"x\"]\n").unwrap_err();
        assert!(matches!(err, BuildError::InvalidRecipe { line: 2, .. }));
    }

    #[test]
    fn test_missing_cmd_is_parseable() {
        // Finalization, not parsing, rejects a recipe without CMD.
        let recipe = parse_recipe("FROM a:b\nRUN echo hi\n").unwrap();
        assert!(recipe.startup.is_none());
    }
}
