use rulener::{Document, Engine, RunSummary, RuntimeError};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const RED: &str = "\x1b[31m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_run(engine: &Engine, doc: &Document, summary: &RunSummary, color: bool) {
    let palette = ansi::Palette::new(color);
    let header = format!("⚙  Annotating {} tokens with {} rules", doc.len(), engine.len());
    println!("\n{}", palette.bold(palette.paint(header, ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Tokens ━━━", ansi::GRAY));
    print_tokens(engine, doc, &palette);

    println!("\n{}", palette.paint("━━━ Rules ━━━", ansi::GRAY));
    print_rules(summary, &palette);

    if !doc.diagnostics().is_empty() {
        println!("\n{}", palette.paint("━━━ Diagnostics ━━━", ansi::GRAY));
        print_diagnostics(doc, &palette);
    }

    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    print_timing(summary, &palette);
    println!();
}

fn print_tokens(engine: &Engine, doc: &Document, palette: &ansi::Palette) {
    for (idx, token) in doc.tokens().iter().enumerate() {
        let annotations: Vec<String> = token
            .annotations()
            .map(|(key, value)| format!("{}={}", palette.paint(engine.keys().label(key), ansi::BLUE), value))
            .collect();
        let text = if annotations.is_empty() {
            palette.dim(token.text())
        } else {
            palette.bold(palette.paint(token.text(), ansi::GREEN))
        };
        println!(
            "  {} {} {} {}",
            palette.paint(format!("[{idx}]"), ansi::GRAY),
            text,
            palette.paint(format!("{}..{}", token.start(), token.end()), ansi::YELLOW),
            annotations.join(" ")
        );
    }
}

fn print_rules(summary: &RunSummary, palette: &ansi::Palette) {
    if summary.rules.is_empty() {
        println!("{}", palette.dim("  No rules loaded"));
        return;
    }

    for rule in &summary.rules {
        let count = if rule.matches > 0 {
            palette.paint(format!("✓ {} matches", rule.matches), ansi::GREEN)
        } else {
            palette.dim("✗ 0 matches")
        };
        println!(
            "  {} {} {}",
            palette.paint(&rule.name, ansi::CYAN),
            palette.dim(format!("({}, stage {})", rule.rule_type, rule.stage)),
            count
        );
    }

    if summary.total_matches() == 0 {
        println!("\n{}", palette.paint("Possible reasons:", ansi::YELLOW));
        println!("  • Token regexes must match a whole token");
        println!("  • Text-rule matches inside a single token are dropped");
        println!("\n{}", palette.dim("  Tip: Set RUST_LOG=rulener=trace to see candidate evaluation"));
    }
}

fn print_diagnostics(doc: &Document, palette: &ansi::Palette) {
    for err in doc.diagnostics() {
        let kind = match err {
            RuntimeError::Match { .. } => "match",
            RuntimeError::Action { .. } => "action",
        };
        println!("  {} {}", palette.paint(kind, ansi::RED), err);
    }
}

fn print_timing(summary: &RunSummary, palette: &ansi::Palette) {
    println!(
        "  Total: {}  │  Changed: {}  │  Diagnostics: {}",
        palette.paint(format!("{:?}", summary.total), ansi::GREEN),
        palette.paint(summary.changed.to_string(), ansi::CYAN),
        palette.dim(summary.diagnostics.to_string()),
    );
    for stage in &summary.stages {
        let mut line = format!(
            "  {} {} {}  committed: {}",
            palette.paint(format!("Stage {}:", stage.stage), ansi::BLUE),
            palette.dim(format!("{:?}", stage.duration)),
            palette.dim(format!("(scan {:?})", stage.scan_duration)),
            stage.committed
        );
        if stage.filtered > 0 {
            line.push_str(&format!("  filtered: {}  vetoed: {}", stage.filtered, stage.vetoed));
        }
        if stage.composite_iterations > 0 {
            line.push_str(&format!(
                "  composite: {} in {} iterations ({:?})",
                stage.composite_committed, stage.composite_iterations, stage.composite_duration
            ));
        }
        println!("{line}");
    }
}
