//! Built-in worker roster and domain signatures.
//!
//! Used by [`StaticSource::builtin`](super::StaticSource::builtin) and as the
//! domain set for sources that only list workers.

use super::domain::DomainSpec;
use super::WorkerProfile;

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

fn domain(id: &str, bias: f64, keywords: &[&str], files: &[&str], verbs: &[&str]) -> DomainSpec {
    DomainSpec {
        id: id.to_string(),
        keywords: words(keywords),
        file_patterns: words(files),
        verbs: words(verbs),
        complexity_bias: bias,
    }
}

fn worker(id: &str, domains: &[&str], affinity: f64, patterns: &[&str]) -> WorkerProfile {
    WorkerProfile {
        id: id.to_string(),
        domains: words(domains),
        complexity_affinity: affinity,
        patterns: words(patterns),
    }
}

/// Domain signatures shipped with the engine.
pub fn builtin_domains() -> Vec<DomainSpec> {
    vec![
        domain(
            "frontend",
            0.7,
            &[
                "react", "vue", "angular", "svelte", "frontend", "front-end", "ui", "ux",
                "component", "components", "jsx", "tsx", "css", "scss", "html", "layout",
                "responsive", "styling", "form", "button", "browser", "dom", "tailwind",
            ],
            &["*.jsx", "*.tsx", "*.vue", "*.svelte", "*.css", "*.scss", "*.html"],
            &["build", "render", "style", "design"],
        ),
        domain(
            "backend",
            0.8,
            &[
                "api", "server", "backend", "back-end", "database", "db", "endpoint",
                "endpoints", "service", "rest", "graphql", "postgres", "postgresql", "mysql",
                "sql", "query", "queries", "schema", "redis", "orm", "middleware",
                "microservice", "microservices", "migration",
            ],
            &["*.py", "*.go", "*.rs", "*.java", "*.sql"],
            &["implement", "integrat", "migrat", "serve", "persist"],
        ),
        domain(
            "security",
            0.9,
            &[
                "security", "secure", "vulnerability", "vulnerabilities", "auth",
                "authentication", "authorization", "encryption", "xss", "csrf", "injection",
                "owasp", "audit", "secrets", "credentials", "cve", "permissions", "tls", "ssl",
            ],
            &["*.pem", "*.key", "*.env"],
            &["audit", "harden", "scan", "encrypt", "sanitiz"],
        ),
        domain(
            "infrastructure",
            0.8,
            &[
                "deploy", "deployment", "docker", "kubernetes", "k8s", "terraform", "ci",
                "cd", "pipeline", "infrastructure", "cloud", "aws", "gcp", "azure", "helm",
                "nginx", "monitoring", "configuration", "container", "containers",
            ],
            &["Dockerfile", "docker-compose*", "*.tf", "*.yaml", "*.yml"],
            &["deploy", "provision", "scal", "configur", "containeriz"],
        ),
        domain(
            "testing",
            0.6,
            &[
                "test", "tests", "testing", "unit", "e2e", "coverage", "jest", "pytest",
                "cypress", "playwright", "mock", "mocks", "fixture", "fixtures", "regression",
                "qa",
            ],
            &["*_test.*", "*.test.*", "*.spec.*", "test_*"],
            &["test", "verif", "assert", "validat", "mock"],
        ),
        domain(
            "documentation",
            0.5,
            &[
                "documentation", "docs", "readme", "docstring", "docstrings", "comments",
                "guide", "tutorial", "changelog", "wiki", "markdown",
            ],
            &["*.md", "*.rst", "*.adoc"],
            &["document", "explain", "describ", "writ"],
        ),
        domain(
            "debugging",
            0.6,
            &[
                "debug", "bug", "bugs", "error", "errors", "crash", "crashes", "exception",
                "failing", "broken", "stacktrace", "traceback", "panic", "leak",
            ],
            &["*.log"],
            &["debug", "fix", "troubleshoot", "diagnos", "investigat"],
        ),
        domain(
            "performance",
            0.75,
            &[
                "performance", "optimization", "optimize", "latency", "throughput", "slow",
                "bottleneck", "profiling", "profile", "memory", "caching", "benchmark",
                "speed",
            ],
            &["*.prof", "*.flamegraph"],
            &["optimiz", "profil", "benchmark", "tun", "speed"],
        ),
    ]
}

/// Worker roster shipped with the engine.
pub fn builtin_workers() -> Vec<WorkerProfile> {
    vec![
        worker(
            "build-frontend",
            &["frontend"],
            0.5,
            &["react", "vue", "angular", "component", "ui", "css", "jsx", "tsx", "layout", "form"],
        ),
        worker(
            "build-backend",
            &["backend"],
            0.6,
            &[
                "api", "endpoint", "server", "database", "postgres", "query", "service", "rest",
                "graphql", "schema",
            ],
        ),
        worker(
            "security-auditor",
            &["security"],
            0.7,
            &["security", "vulnerability", "audit", "auth", "encryption", "owasp", "xss", "csrf"],
        ),
        worker(
            "deploy-application",
            &["infrastructure"],
            0.6,
            &["deploy", "docker", "kubernetes", "terraform", "pipeline", "ci", "helm", "cloud"],
        ),
        worker(
            "test-automation",
            &["testing"],
            0.4,
            &["test", "tests", "coverage", "jest", "pytest", "e2e", "mock", "regression"],
        ),
        worker(
            "documentation-expert",
            &["documentation"],
            0.3,
            &["docs", "documentation", "readme", "guide", "tutorial", "changelog"],
        ),
        worker(
            "debug-issue",
            &["debugging"],
            0.5,
            &["bug", "error", "crash", "exception", "fix", "debug", "failing", "traceback"],
        ),
        worker(
            "performance-engineer",
            &["performance", "backend"],
            0.7,
            &[
                "performance", "optimization", "optimize", "latency", "slow", "bottleneck",
                "profiling", "memory",
            ],
        ),
        worker(
            "architect-specialist",
            &["backend", "infrastructure"],
            0.9,
            &["architecture", "design", "system", "microservices", "scalability", "patterns"],
        ),
        worker(
            "general-purpose",
            &[],
            0.3,
            &["check", "status", "read", "show", "list", "find", "search", "view", "get"],
        ),
    ]
}
