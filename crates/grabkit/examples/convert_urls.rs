//! Example: convert a handful of live URLs and check the results
//!
//! Run with: cargo run -p grabkit --example convert_urls

use grabkit::{ConvertRequest, OutputFormat, PayloadFormat, Tool, TransformedPayload};

struct Case {
    url: &'static str,
    description: &'static str,
    format: OutputFormat,
    expect_format: PayloadFormat,
    expect_contains: Option<&'static str>,
}

const CASES: &[Case] = &[
    Case {
        url: "https://example.com",
        description: "Simple HTML page as markdown",
        format: OutputFormat::Markdown,
        expect_format: PayloadFormat::Markdown,
        expect_contains: Some("Example Domain"),
    },
    Case {
        url: "https://httpbin.org/html",
        description: "HTML page as plain text",
        format: OutputFormat::Text,
        expect_format: PayloadFormat::Text,
        expect_contains: Some("Herman Melville"),
    },
    Case {
        url: "https://httpbin.org/json",
        description: "JSON endpoint, pretty-printed",
        format: OutputFormat::Text,
        expect_format: PayloadFormat::Json,
        expect_contains: Some("slideshow"),
    },
    Case {
        url: "https://httpbin.org/image/png",
        description: "Image, described not converted",
        format: OutputFormat::Text,
        expect_format: PayloadFormat::Binary,
        expect_contains: None,
    },
];

#[tokio::main]
async fn main() {
    println!("GrabKit URL Examples");
    println!("====================\n");

    let tool = match Tool::builder().build() {
        Ok(tool) => tool,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let mut passed = 0;
    let mut failed = 0;

    for (i, case) in CASES.iter().enumerate() {
        println!("{}. {}", i + 1, case.description);
        println!("   URL: {}", case.url);

        let request = ConvertRequest::new(case.url).format(case.format);
        match tool.convert(request).await {
            Ok(payload) => {
                print_summary(&payload);
                if meets_expectations(case, &payload) {
                    println!("   PASS\n");
                    passed += 1;
                } else {
                    println!("   FAIL (expectations not met)\n");
                    failed += 1;
                }
            }
            Err(e) => {
                println!("   Error: {}", e);
                println!("   FAIL\n");
                failed += 1;
            }
        }
    }

    println!("====================");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed > 0 {
        std::process::exit(1);
    }
}

fn print_summary(payload: &TransformedPayload) {
    println!("   Format: {:?}", payload.format);
    println!("   Content-Type: {}", payload.content_type);

    if let Some(size) = payload.size {
        println!("   Size: {} chars", size);
    }
    if let Some(info) = &payload.file_info {
        println!("   File size: {}", info.file_size_formatted);
    }
    if let Some(meta) = &payload.metadata {
        println!("   Title: {}", meta.title);
    }
    if let Some(content) = &payload.content {
        let preview: String = content.chars().take(100).collect();
        println!(
            "   Preview: {}{}",
            preview.replace('\n', " "),
            if content.chars().count() > 100 { "..." } else { "" }
        );
    }
}

fn meets_expectations(case: &Case, payload: &TransformedPayload) -> bool {
    if payload.format != case.expect_format {
        println!(
            "   Expected format {:?}, got {:?}",
            case.expect_format, payload.format
        );
        return false;
    }

    if let Some(expected) = case.expect_contains {
        let content = payload.content.as_deref().unwrap_or("");
        if !content.contains(expected) {
            println!("   Expected content to contain '{}'", expected);
            return false;
        }
    }

    true
}
