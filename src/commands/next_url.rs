use anyhow::{Context, Result};
use recrawl::pagination::UrlPattern;

/// Continuation URL for `url`, or `None` when the pattern yields no further
/// page (the URL comes back unchanged).
fn continuation(pattern: &UrlPattern, url: &str, page: Option<u32>) -> Result<Option<String>> {
    let next = match page {
        Some(page) => pattern.url_for_page(url, page)?,
        None => pattern.next_url(url)?,
    };
    Ok((page.is_some() || next != url).then_some(next))
}

/// Print the detected pattern and the continuation URL for `url`
pub fn next_url(url: &str, page: Option<u32>, page_size: u32) -> Result<()> {
    let pattern = UrlPattern::detect(url, page_size).context("Cannot paginate this URL")?;
    println!("Pattern: {}", pattern.kind);

    match continuation(&pattern, url, page)? {
        Some(next) => println!("{}", next),
        None => anyhow::bail!("No further page after {}; pagination exhausted", url),
    }
    Ok(())
}
