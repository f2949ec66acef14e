use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference to a base image in the local catalog: `name:tag`, optionally
/// pinned to a content digest as `name:tag@sha256:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseImageRef {
    pub name: String,
    pub tag: String,
    pub digest: Option<String>,
}

impl BaseImageRef {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            digest: None,
        }
    }
}

impl fmt::Display for BaseImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)?;
        if let Some(digest) = &self.digest {
            write!(f, "@sha256:{}", digest)?;
        }
        Ok(())
    }
}

impl FromStr for BaseImageRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (reference, digest) = match s.split_once('@') {
            Some((r, d)) => {
                let hex = d
                    .strip_prefix("sha256:")
                    .ok_or_else(|| format!("unsupported digest algorithm in '{}'", s))?;
                if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(format!("malformed digest in '{}'", s));
                }
                (r, Some(hex.to_string()))
            }
            None => (s, None),
        };

        let (name, tag) = match reference.rsplit_once(':') {
            Some((n, t)) => (n, t),
            None => (reference, "latest"),
        };
        if name.is_empty() || tag.is_empty() {
            return Err(format!("malformed base image reference '{}'", s));
        }

        Ok(Self {
            name: name.to_string(),
            tag: tag.to_string(),
            digest,
        })
    }
}

/// The argument vector recorded as the image's default command. It is stored
/// verbatim at build time and handed to process creation without any shell
/// interpretation when a container is instantiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupDirective {
    pub argv: Vec<String>,
}

impl StartupDirective {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    pub fn executable(&self) -> Option<&str> {
        self.argv.first().map(|s| s.as_str())
    }

    pub fn arguments(&self) -> &[String] {
        if self.argv.is_empty() {
            &[]
        } else {
            &self.argv[1..]
        }
    }
}

/// One filesystem-mutating instruction of the build pipeline. Steps are
/// applied strictly in declaration order; each one's output snapshot key is a
/// deterministic function of its parent key, kind and inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildStep {
    Workdir { path: String },
    Copy { sources: Vec<String>, dest: String },
    Run { command: String },
}

impl BuildStep {
    pub fn kind(&self) -> &'static str {
        match self {
            BuildStep::Workdir { .. } => "workdir",
            BuildStep::Copy { .. } => "copy",
            BuildStep::Run { .. } => "run",
        }
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::Workdir { path } => write!(f, "WORKDIR {}", path),
            BuildStep::Copy { sources, dest } => {
                write!(f, "COPY {} {}", sources.join(" "), dest)
            }
            BuildStep::Run { command } => write!(f, "RUN {}", command),
        }
    }
}

/// A parsed build recipe: base selection, ordered build steps and the final
/// startup directive. `startup` is `None` when the recipe never declared one;
/// finalization rejects that before any image is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub base: BaseImageRef,
    pub steps: Vec<BuildStep>,
    pub startup: Option<StartupDirective>,
}
