//! Fixed technology detection rules.
//!
//! Keyword rules run case-insensitively on word boundaries over entry text;
//! extension rules run over modified file paths. The output is the sorted,
//! deduplicated set of matched names.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

struct TechRule {
    name: &'static str,
    pattern: Regex,
}

fn keyword_rule(name: &'static str, keywords: &[&str]) -> TechRule {
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    TechRule {
        name,
        pattern: Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("tech rule regex"),
    }
}

static TECH_RULES: Lazy<Vec<TechRule>> = Lazy::new(|| {
    vec![
        // Languages
        keyword_rule("rust", &["rust", "cargo"]),
        keyword_rule("typescript", &["typescript"]),
        keyword_rule("javascript", &["javascript"]),
        keyword_rule("python", &["python", "pip"]),
        keyword_rule("go", &["golang"]),
        keyword_rule("java", &["java"]),
        keyword_rule("ruby", &["ruby", "rails"]),
        keyword_rule("kotlin", &["kotlin"]),
        keyword_rule("swift", &["swiftui"]),
        // Frameworks
        keyword_rule("react", &["react", "jsx"]),
        keyword_rule("vue", &["vuejs", "vue 3"]),
        keyword_rule("svelte", &["svelte"]),
        keyword_rule("nextjs", &["next.js", "nextjs"]),
        keyword_rule("django", &["django"]),
        keyword_rule("flask", &["flask"]),
        keyword_rule("express", &["express.js", "expressjs"]),
        keyword_rule("axum", &["axum"]),
        keyword_rule("tokio", &["tokio"]),
        // Cloud
        keyword_rule("aws", &["aws", "s3", "lambda", "dynamodb"]),
        keyword_rule("gcp", &["gcp", "bigquery", "cloud run"]),
        keyword_rule("azure", &["azure"]),
        keyword_rule("cloudflare", &["cloudflare", "workers kv"]),
        keyword_rule("vercel", &["vercel"]),
        // Databases
        keyword_rule("postgres", &["postgres", "postgresql"]),
        keyword_rule("mysql", &["mysql"]),
        keyword_rule("sqlite", &["sqlite"]),
        keyword_rule("redis", &["redis"]),
        keyword_rule("mongodb", &["mongodb", "mongo"]),
        // Build & infra
        keyword_rule("docker", &["docker", "dockerfile"]),
        keyword_rule("kubernetes", &["kubernetes", "k8s"]),
        keyword_rule("webpack", &["webpack"]),
        keyword_rule("vite", &["vite"]),
        keyword_rule("npm", &["npm"]),
        keyword_rule("yarn", &["yarn"]),
        keyword_rule("pnpm", &["pnpm"]),
        keyword_rule("gradle", &["gradle"]),
        keyword_rule("maven", &["maven"]),
        keyword_rule("graphql", &["graphql"]),
        keyword_rule("terraform", &["terraform"]),
        // Test frameworks
        keyword_rule("jest", &["jest"]),
        keyword_rule("pytest", &["pytest"]),
        keyword_rule("vitest", &["vitest"]),
        keyword_rule("playwright", &["playwright"]),
        keyword_rule("cypress", &["cypress"]),
    ]
});

const EXTENSION_RULES: [(&str, &str); 12] = [
    (".rs", "rust"),
    (".ts", "typescript"),
    (".tsx", "typescript"),
    (".js", "javascript"),
    (".jsx", "javascript"),
    (".py", "python"),
    (".go", "go"),
    (".rb", "ruby"),
    (".java", "java"),
    (".kt", "kotlin"),
    (".swift", "swift"),
    (".vue", "vue"),
];

/// Match the fixed rule set against session text and modified file paths.
pub fn detect_technologies(text: &str, file_paths: &[String]) -> Vec<String> {
    let mut found: BTreeSet<&'static str> = BTreeSet::new();

    for rule in TECH_RULES.iter() {
        if rule.pattern.is_match(text) {
            found.insert(rule.name);
        }
    }

    for path in file_paths {
        let lower = path.to_lowercase();
        for (ext, name) in EXTENSION_RULES {
            if lower.ends_with(ext) {
                found.insert(name);
            }
        }
        for rule in TECH_RULES.iter() {
            if rule.pattern.is_match(&lower) {
                found.insert(rule.name);
            }
        }
    }

    found.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_matching_is_case_insensitive() {
        let techs = detect_technologies("Deploy the Tokio service behind POSTGRES", &[]);
        assert!(techs.contains(&"tokio".to_string()));
        assert!(techs.contains(&"postgres".to_string()));
    }

    #[test]
    fn test_word_boundaries_prevent_substring_hits() {
        // "javan" must not match java; "viterbi" must not match vite.
        let techs = detect_technologies("the javan viterbi decoder", &[]);
        assert!(techs.is_empty());
    }

    #[test]
    fn test_extensions_from_modified_files() {
        let techs = detect_technologies("", &["src/main.rs".into(), "web/app.tsx".into()]);
        assert_eq!(techs, vec!["rust".to_string(), "typescript".to_string()]);
    }

    #[test]
    fn test_duplicates_collapse() {
        let techs = detect_technologies("rust rust RUST cargo", &["lib.rs".into()]);
        assert_eq!(techs, vec!["rust".to_string()]);
    }
}
