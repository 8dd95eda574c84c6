//! The `coursegrade init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("coursegrade.toml").exists() {
        println!("coursegrade.toml already exists, skipping.");
    } else {
        std::fs::write("coursegrade.toml", SAMPLE_CONFIG)?;
        println!("Created coursegrade.toml");
    }

    std::fs::create_dir_all("courses")?;
    let example_path = Path::new("courses/example.toml");
    if example_path.exists() {
        println!("courses/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_COURSE)?;
        println!("Created courses/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Point coursegrade.toml at your execution services");
    println!("  2. Run: coursegrade validate --course courses/example.toml");
    println!("  3. Run: coursegrade grade --course courses/example.toml --task blue-heading");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# coursegrade configuration

# Wait bound for each remote execution call.
timeout_ms = 7000

# Where the CLI keeps learner progress.
progress_file = "./coursegrade-progress.json"

# `${VAR}` references are read from the environment.
[executors.javascript]
base_url = "http://localhost:3000"

[executors.php]
base_url = "${PHP_EXECUTOR_URL}"
"#;

const EXAMPLE_COURSE: &str = r#"[course]
id = "example"
title = "Example Course"
description = "A small course to get started"

[[contents]]
id = "welcome"
title = "Welcome"
kind = "lesson"
task_text = "Every page starts with some markup."
step_order = 1
tags = ["basics"]

[[contents]]
id = "blue-heading"
title = "A blue heading"
task_text = "Give the page a heading that says Hello and make it blue."
step_order = 2
tags = ["basics"]

[contents.sample_code]
"index.html" = "<h1>Hello</h1>"
"style.css" = "h1 {\n  \n}\n"

[[contents.test_cases]]
file_name = "index.html"
input = "h1"
expected_output = "Hello"

[[contents.test_cases]]
file_name = "style.css"
input = "h1"

[contents.test_cases.expected_style]
color = "blue"
"#;
