use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize)]
struct Row {
    email_id: String,
    from: String,
    subject: String,
    date_received: Option<String>,
    plain_text: String,
    html_body: String,
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <search_query> [emails.csv]", args[0]);
        eprintln!("Search query matches against Sender or Subject.");
        std::process::exit(1);
    }

    let query = args[1].to_lowercase();
    let csv_path = args.get(2).map(String::as_str).unwrap_or("data/emails.csv");

    let mut reader = csv::Reader::from_path(csv_path)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", csv_path, e))?;

    let mut found = None;
    for row in reader.deserialize::<Row>() {
        let row = row?;
        if row.from.to_lowercase().contains(&query) || row.subject.to_lowercase().contains(&query) {
            found = Some(row);
            break;
        }
    }

    let Some(row) = found else {
        println!("No messages found matching '{}'", args[1]);
        return Ok(());
    };

    let rule = "-".repeat(80);
    println!("Found Message:");
    println!("ID: {}", row.email_id);
    println!("From: {}", row.from);
    println!("Subject: {}", row.subject);
    println!("Date: {}", row.date_received.as_deref().unwrap_or("(unknown)"));
    println!("{}", rule);
    println!("PLAIN TEXT (Raw Debug):");
    println!("{:?}", row.plain_text);
    println!("{}", rule);
    println!("PLAIN TEXT (Display):");
    if row.plain_text.is_empty() {
        println!("(None)");
    } else {
        println!("{}", row.plain_text);
    }
    println!("{}", rule);
    println!("HTML BODY (Raw Debug):");
    println!("{:?}", row.html_body);
    println!("{}", rule);

    Ok(())
}
