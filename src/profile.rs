use crate::error::JudgeError;
use crate::utils::is_plain_file_name;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// How a language turns source into a running process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Toolchain {
    Interpreted {
        run: Vec<String>,
    },
    Compiled {
        compile: Vec<String>,
        run: Vec<String>,
    },
}

impl Toolchain {
    pub fn compile_command(&self) -> Option<&[String]> {
        match self {
            Toolchain::Interpreted { .. } => None,
            Toolchain::Compiled { compile, .. } => Some(compile.as_slice()),
        }
    }

    pub fn run_command(&self) -> &[String] {
        match self {
            Toolchain::Interpreted { run } | Toolchain::Compiled { run, .. } => run.as_slice(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub language: String,

    #[serde(default)]
    pub aliases: Vec<String>,

    /// Execution environment image.
    pub image: String,

    /// File name the source code is written to inside the workspace.
    pub source_file: String,

    #[serde(flatten)]
    pub toolchain: Toolchain,
}

impl Profile {
    pub fn needs_compile(&self) -> bool {
        self.toolchain.compile_command().is_some()
    }

    fn matches(&self, language: &str) -> bool {
        self.language.eq_ignore_ascii_case(language)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(language))
    }
}

fn argv(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

static BUILTIN: Lazy<ProfileTable> = Lazy::new(|| ProfileTable {
    profiles: vec![
        Profile {
            language: "python".into(),
            aliases: argv(&["py", "python3"]),
            image: "python:3.11-slim".into(),
            source_file: "code.py".into(),
            toolchain: Toolchain::Interpreted {
                run: argv(&["python3", "code.py"]),
            },
        },
        Profile {
            language: "cpp".into(),
            aliases: argv(&["c++", "cxx"]),
            image: "gcc:12".into(),
            source_file: "code.cpp".into(),
            toolchain: Toolchain::Compiled {
                compile: argv(&["g++", "code.cpp", "-O2", "-std=c++17", "-o", "code_exec"]),
                run: argv(&["./code_exec"]),
            },
        },
        Profile {
            language: "java".into(),
            aliases: vec![],
            image: "openjdk:17".into(),
            source_file: "Main.java".into(),
            toolchain: Toolchain::Compiled {
                compile: argv(&["javac", "Main.java"]),
                run: argv(&["java", "Main"]),
            },
        },
    ],
});

/// Language profiles, read-only once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileTable {
    profiles: Vec<Profile>,
}

impl ProfileTable {
    pub fn builtin() -> &'static ProfileTable {
        &BUILTIN
    }

    pub fn new(profiles: Vec<Profile>) -> Result<Self> {
        let table = Self { profiles };
        table.validate()?;
        Ok(table)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let profiles: Vec<Profile> =
            serde_json::from_str(content).context("failed to parse language profiles")?;
        Self::new(profiles)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read profiles: path = {}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn resolve(&self, language: &str) -> Result<&Profile, JudgeError> {
        let language = language.trim();
        self.profiles
            .iter()
            .find(|p| p.matches(language))
            .ok_or_else(|| JudgeError::UnsupportedLanguage(language.to_owned()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter()
    }

    fn validate(&self) -> Result<()> {
        if self.profiles.is_empty() {
            anyhow::bail!("at least one language profile is required");
        }

        let mut seen = HashSet::new();
        for p in &self.profiles {
            for name in std::iter::once(&p.language).chain(&p.aliases) {
                if !seen.insert(name.to_ascii_lowercase()) {
                    anyhow::bail!("duplicate language id: {}", name);
                }
            }

            if p.image.is_empty() {
                anyhow::bail!("profile {} has no image", p.language);
            }
            if !is_plain_file_name(Path::new(&p.source_file)) {
                anyhow::bail!(
                    "profile {} has an invalid source file: {}",
                    p.language,
                    p.source_file
                );
            }
            if p.toolchain.run_command().is_empty() {
                anyhow::bail!("profile {} has an empty run command", p.language);
            }
            if let Some(compile) = p.toolchain.compile_command() {
                if compile.is_empty() {
                    anyhow::bail!("profile {} has an empty compile command", p.language);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profiles() {
        let table = ProfileTable::builtin();
        table.validate().unwrap();

        let python = table.resolve("python").unwrap();
        assert!(!python.needs_compile());
        assert_eq!(python.toolchain.run_command(), ["python3", "code.py"]);

        let cpp = table.resolve("CPP").unwrap();
        assert!(cpp.needs_compile());
        assert_eq!(cpp.image, "gcc:12");

        assert_eq!(table.resolve("c++").unwrap().language, "cpp");
        assert_eq!(table.resolve(" py ").unwrap().language, "python");
        assert_eq!(table.resolve("java").unwrap().source_file, "Main.java");
    }

    #[test]
    fn unsupported_language() {
        let err = ProfileTable::builtin().resolve("brainfuck").unwrap_err();
        assert!(matches!(err, JudgeError::UnsupportedLanguage(ref l) if l == "brainfuck"));
    }

    #[test]
    fn profiles_from_json() {
        let table = ProfileTable::from_json(
            r#"[
                {"language": "ruby", "image": "ruby:3", "source_file": "code.rb",
                 "kind": "interpreted", "run": ["ruby", "code.rb"]},
                {"language": "rust", "aliases": ["rs"], "image": "rust:1", "source_file": "main.rs",
                 "kind": "compiled", "compile": ["rustc", "-O", "main.rs"], "run": ["./main"]}
            ]"#,
        )
        .unwrap();

        assert!(!table.resolve("ruby").unwrap().needs_compile());
        let rust = table.resolve("rs").unwrap();
        assert_eq!(
            rust.toolchain.compile_command().unwrap(),
            ["rustc", "-O", "main.rs"]
        );
        assert!(table.resolve("python").is_err());
    }

    #[test]
    fn invalid_tables_are_rejected() {
        fn profile(language: &str, source_file: &str, run: &str) -> String {
            format!(
                r#"{{"language": "{}", "image": "i", "source_file": "{}",
                    "kind": "interpreted", "run": {}}}"#,
                language, source_file, run
            )
        }

        assert!(ProfileTable::from_json("[]").is_err());

        let escaping = format!("[{}]", profile("x", "../x", r#"["x"]"#));
        assert!(ProfileTable::from_json(&escaping).is_err());

        let empty_run = format!("[{}]", profile("x", "x", "[]"));
        assert!(ProfileTable::from_json(&empty_run).is_err());

        let duplicate = format!(
            "[{}, {}]",
            profile("x", "x", r#"["x"]"#),
            profile("X", "x", r#"["x"]"#)
        );
        assert!(ProfileTable::from_json(&duplicate).is_err());

        let ok = format!("[{}]", profile("x", "x", r#"["x"]"#));
        assert!(ProfileTable::from_json(&ok).is_ok());
    }
}
