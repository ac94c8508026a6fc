use templar::rules::file_name::FileMask;
use templar::{Outcome, Phase, ResolutionVerbose, ResolveDetails};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
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
            self.wrap(s.as_ref(), color)
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            self.wrap(s.as_ref(), BOLD)
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            self.wrap(s.as_ref(), DIM)
        }

        fn wrap(&self, s: &str, code: &str) -> String {
            if self.enabled { format!("{code}{s}{RESET}") } else { s.to_string() }
        }
    }
}

pub fn print_run(input: &str, res: &ResolutionVerbose<FileMask>, delimiter: &str, color: bool) {
    let palette = ansi::Palette::new(color);
    let details = &res.details;
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Resolving: \"{input}\""), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Tokens ━━━", ansi::GRAY));
    println!("  {} {}", palette.dim("template:   "), palette.paint(&details.template, ansi::YELLOW));
    println!("  {} {}", palette.dim("fingerprint:"), palette.dim(&details.fingerprint));
    println!("  {} {}", palette.dim("rules:      "), palette.paint(details.active_rules.join(", "), ansi::BLUE));

    println!("\n{}", palette.paint("━━━ Knowledge Base ━━━", ansi::GRAY));
    print_knowledge_base(details, &palette);

    if !details.sweeps.is_empty() {
        println!("\n{}", palette.paint("━━━ Sweeps ━━━", ansi::GRAY));
        print_sweeps(details, &palette);
    }

    println!("\n{}", palette.paint("━━━ Result ━━━", ansi::GRAY));
    let resolution = &res.resolution;
    let outcome = match resolution.outcome {
        Outcome::KnowledgeBase => palette.paint("✓ knowledge base", ansi::GREEN),
        Outcome::Rules => palette.paint("✓ rules", ansi::GREEN),
        Outcome::Partial => palette.paint("✗ partial", ansi::YELLOW),
    };
    println!("  {}  {} {}", palette.bold(palette.paint(resolution.rendered(), ansi::GREEN)), palette.dim("│"), outcome);
    for (idx, run) in resolution.runs(delimiter).iter().enumerate() {
        let mask = if run.mask == FileMask::Unknown {
            palette.paint(run.mask.display(), ansi::YELLOW)
        } else {
            palette.paint(run.mask.display(), ansi::BLUE)
        };
        println!(
            "  {} {} {} {} {}",
            palette.paint(format!("[{idx}]"), ansi::GRAY),
            mask,
            palette.bold(&run.value),
            palette.dim("│"),
            palette.dim(format!("tokens {}..{}", run.tokens.start, run.tokens.end)),
        );
    }

    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    let lookup = details.knowledge_base.as_ref().map(|kb| kb.duration).unwrap_or_default();
    println!(
        "  Total: {}  │  Knowledge base: {}  │  Evaluation: {}",
        palette.paint(format!("{:?}", details.total), ansi::GREEN),
        palette.dim(format!("{lookup:?}")),
        palette.paint(format!("{:?}", details.evaluation_total), ansi::CYAN),
    );
    println!();
}

fn print_knowledge_base(details: &ResolveDetails, palette: &ansi::Palette) {
    let Some(kb) = &details.knowledge_base else {
        println!("  {}", palette.dim("disabled"));
        return;
    };

    let verdict = if kb.accepted {
        palette.paint("✓ applied", ansi::GREEN)
    } else if kb.passing > 1 {
        palette.paint("✗ ambiguous", ansi::YELLOW)
    } else {
        palette.dim("✗ miss")
    };
    println!(
        "  {} {}  {} {}  {}",
        palette.dim("candidates:"),
        palette.paint(kb.candidates.to_string(), ansi::YELLOW),
        palette.dim("passing:"),
        palette.paint(kb.passing.to_string(), ansi::YELLOW),
        verdict,
    );
}

fn print_sweeps(details: &ResolveDetails, palette: &ansi::Palette) {
    for sweep in &details.sweeps {
        let label = match sweep.phase {
            Phase::Individual => format!("Sweep {} (individual):", sweep.sweep),
            Phase::Sequence => format!("Sweep {} (sequence):  ", sweep.sweep),
        };

        println!(
            "  {} {}  {}",
            palette.paint(label, ansi::BLUE),
            if sweep.assigned > 0 {
                palette.paint(format!("✓ {} assigned", sweep.assigned), ansi::GREEN)
            } else {
                palette.dim(format!("✗ {} assigned", sweep.assigned))
            },
            palette.dim(format!(
                "{} candidates, {} checks, {:?}",
                sweep.candidates, sweep.rule_checks, sweep.duration
            )),
        );
    }
}
