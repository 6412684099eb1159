// src/categories.rs
//! URL → coarse topic category.
//!
//! Lookup order: exact domain table (with and without `www.`), subdomain suffix
//! match against the table, keyword scoring over the full URL, else `Unknown`.
//! Explicit domain knowledge always outranks keyword inference.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Social,
    Entertainment,
    News,
    Dev,
    Productivity,
    Reference,
    Shopping,
    Gaming,
    Search,
    Ai,
    Finance,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Social => "social",
            Category::Entertainment => "entertainment",
            Category::News => "news",
            Category::Dev => "dev",
            Category::Productivity => "productivity",
            Category::Reference => "reference",
            Category::Shopping => "shopping",
            Category::Gaming => "gaming",
            Category::Search => "search",
            Category::Ai => "ai",
            Category::Finance => "finance",
            Category::Unknown => "unknown",
        }
    }

    /// Search engines and AI assistants count as research tools in every mode.
    pub fn is_research_tool(&self) -> bool {
        matches!(self, Category::Search | Category::Ai)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use Category::*;

/// Static domain table. Entries may carry a `www.` prefix; lookups check both forms.
pub static DOMAIN_CATEGORIES: &[(&str, Category)] = &[
    // social
    ("facebook.com", Social), ("www.facebook.com", Social), ("twitter.com", Social),
    ("x.com", Social), ("www.x.com", Social), ("instagram.com", Social),
    ("www.instagram.com", Social), ("linkedin.com", Social), ("www.linkedin.com", Social),
    ("reddit.com", Social), ("www.reddit.com", Social), ("old.reddit.com", Social),
    ("tiktok.com", Social), ("www.tiktok.com", Social), ("snapchat.com", Social),
    ("threads.net", Social), ("mastodon.social", Social), ("bsky.app", Social),
    ("discord.com", Social), ("tumblr.com", Social), ("pinterest.com", Social),
    ("www.pinterest.com", Social),
    // entertainment & streaming
    ("youtube.com", Entertainment), ("www.youtube.com", Entertainment),
    ("netflix.com", Entertainment), ("www.netflix.com", Entertainment),
    ("hulu.com", Entertainment), ("disneyplus.com", Entertainment),
    ("primevideo.com", Entertainment), ("hbomax.com", Entertainment),
    ("max.com", Entertainment), ("twitch.tv", Entertainment), ("www.twitch.tv", Entertainment),
    ("crunchyroll.com", Entertainment), ("peacocktv.com", Entertainment),
    ("paramountplus.com", Entertainment), ("hotstar.com", Entertainment),
    ("www.hotstar.com", Entertainment), ("jiocinema.com", Entertainment),
    ("spotify.com", Entertainment), ("open.spotify.com", Entertainment),
    ("music.youtube.com", Entertainment), ("soundcloud.com", Entertainment),
    ("9gag.com", Entertainment), ("imgur.com", Entertainment), ("buzzfeed.com", Entertainment),
    // news
    ("news.google.com", News), ("cnn.com", News), ("bbc.com", News), ("bbc.co.uk", News),
    ("nytimes.com", News), ("washingtonpost.com", News), ("theguardian.com", News),
    ("reuters.com", News), ("apnews.com", News), ("aljazeera.com", News),
    ("foxnews.com", News), ("cnbc.com", News), ("bloomberg.com", News),
    ("techcrunch.com", News), ("theverge.com", News), ("arstechnica.com", News),
    ("wired.com", News), ("engadget.com", News), ("ndtv.com", News),
    ("timesofindia.indiatimes.com", News), ("hindustantimes.com", News),
    // developer
    ("github.com", Dev), ("www.github.com", Dev), ("gitlab.com", Dev), ("bitbucket.org", Dev),
    ("stackoverflow.com", Dev), ("stackexchange.com", Dev), ("dev.to", Dev),
    ("hashnode.dev", Dev), ("codepen.io", Dev), ("codesandbox.io", Dev), ("replit.com", Dev),
    ("npmjs.com", Dev), ("pypi.org", Dev), ("crates.io", Dev), ("vercel.com", Dev),
    ("netlify.com", Dev), ("heroku.com", Dev), ("aws.amazon.com", Dev),
    ("console.cloud.google.com", Dev), ("portal.azure.com", Dev),
    // productivity
    ("docs.google.com", Productivity), ("drive.google.com", Productivity),
    ("sheets.google.com", Productivity), ("slides.google.com", Productivity),
    ("mail.google.com", Productivity), ("outlook.live.com", Productivity),
    ("outlook.office.com", Productivity), ("office.com", Productivity),
    ("notion.so", Productivity), ("www.notion.so", Productivity),
    ("trello.com", Productivity), ("asana.com", Productivity),
    ("jira.atlassian.com", Productivity), ("atlassian.com", Productivity),
    ("slack.com", Productivity), ("app.slack.com", Productivity),
    ("teams.microsoft.com", Productivity), ("figma.com", Productivity),
    ("www.figma.com", Productivity), ("canva.com", Productivity),
    ("calendar.google.com", Productivity), ("linear.app", Productivity),
    ("clickup.com", Productivity), ("monday.com", Productivity),
    ("basecamp.com", Productivity), ("airtable.com", Productivity),
    // reference & learning
    ("wikipedia.org", Reference), ("en.wikipedia.org", Reference),
    ("scholar.google.com", Reference), ("arxiv.org", Reference), ("medium.com", Reference),
    ("substack.com", Reference), ("quora.com", Reference), ("khanacademy.org", Reference),
    ("coursera.org", Reference), ("udemy.com", Reference), ("edx.org", Reference),
    ("brilliant.org", Reference), ("codecademy.com", Reference),
    ("freecodecamp.org", Reference), ("w3schools.com", Reference),
    ("developer.mozilla.org", Reference), ("mdn.io", Reference),
    ("docs.python.org", Reference), ("learn.microsoft.com", Reference),
    ("reactjs.org", Reference), ("vuejs.org", Reference), ("angular.io", Reference),
    ("nextjs.org", Reference),
    // shopping
    ("amazon.com", Shopping), ("www.amazon.com", Shopping), ("amazon.in", Shopping),
    ("www.amazon.in", Shopping), ("flipkart.com", Shopping), ("www.flipkart.com", Shopping),
    ("ebay.com", Shopping), ("etsy.com", Shopping), ("walmart.com", Shopping),
    ("target.com", Shopping), ("myntra.com", Shopping), ("ajio.com", Shopping),
    ("aliexpress.com", Shopping),
    // gaming
    ("store.steampowered.com", Gaming), ("steampowered.com", Gaming),
    ("epicgames.com", Gaming), ("ign.com", Gaming), ("kotaku.com", Gaming),
    ("gamespot.com", Gaming), ("roblox.com", Gaming), ("chess.com", Gaming),
    ("lichess.org", Gaming), ("poki.com", Gaming),
    // search
    ("google.com", Search), ("www.google.com", Search), ("bing.com", Search),
    ("www.bing.com", Search), ("duckduckgo.com", Search), ("search.yahoo.com", Search),
    ("perplexity.ai", Search),
    // ai tools
    ("chat.openai.com", Ai), ("chatgpt.com", Ai), ("claude.ai", Ai),
    ("gemini.google.com", Ai), ("bard.google.com", Ai), ("copilot.microsoft.com", Ai),
    ("midjourney.com", Ai),
    // finance
    ("moneycontrol.com", Finance), ("zerodha.com", Finance), ("groww.in", Finance),
    ("finance.yahoo.com", Finance), ("robinhood.com", Finance), ("coinbase.com", Finance),
];

/// URL keyword hints, in tie-break order (first with the best score wins).
pub static URL_KEYWORD_CATEGORIES: &[(Category, &[&str])] = &[
    (Social, &["feed", "timeline", "stories", "profile", "follow", "friends", "social"]),
    (
        Entertainment,
        &[
            "watch", "video", "stream", "movie", "show", "episode", "play", "music", "listen",
            "podcast", "anime", "manga", "comic", "meme",
        ],
    ),
    (News, &["news", "article", "headline", "breaking", "politics", "opinion", "editorial"]),
    (
        Shopping,
        &["shop", "buy", "cart", "checkout", "product", "deal", "price", "order", "wishlist"],
    ),
    (Gaming, &["game", "gaming", "esports", "clan", "guild", "leaderboard"]),
    (
        Reference,
        &[
            "wiki", "documentation", "docs", "tutorial", "guide", "learn", "course", "lesson",
            "study", "research", "paper", "journal",
        ],
    ),
    (
        Dev,
        &["api", "repository", "commit", "pull-request", "issue", "code", "debug", "deploy", "pipeline"],
    ),
    (Productivity, &["task", "project", "board", "sprint", "calendar", "meeting", "agenda"]),
];

/// Hostname without a leading `www.`; "" for unparseable URLs.
pub fn extract_domain(url: &str) -> String {
    match Url::parse(url) {
        Ok(u) => {
            let host = u.host_str().unwrap_or_default();
            host.strip_prefix("www.").unwrap_or(host).to_string()
        }
        Err(_) => String::new(),
    }
}

/// Browser-internal pages are never evaluated.
pub fn is_internal_url(url: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "chrome://",
        "chrome-extension://",
        "about:",
        "edge://",
        "moz-extension://",
    ];
    PREFIXES.iter().any(|p| url.starts_with(p))
}

fn lookup_exact(domain: &str) -> Option<Category> {
    DOMAIN_CATEGORIES
        .iter()
        .find(|(d, _)| *d == domain)
        .map(|(_, c)| *c)
}

fn lookup_suffix(domain: &str) -> Option<Category> {
    DOMAIN_CATEGORIES.iter().find_map(|(mapped, cat)| {
        let bare = mapped.strip_prefix("www.").unwrap_or(mapped);
        let is_sub = domain.len() > bare.len() + 1
            && domain.ends_with(bare)
            && domain.as_bytes()[domain.len() - bare.len() - 1] == b'.';
        is_sub.then_some(*cat)
    })
}

/// Keyword fallback: count literal substring hits per category over the lowercased URL.
fn lookup_keywords(url: &str) -> Option<Category> {
    let lower = url.to_lowercase();
    let mut best: Option<(Category, usize)> = None;
    for (cat, keywords) in URL_KEYWORD_CATEGORIES {
        let score = keywords.iter().filter(|kw| lower.contains(*kw)).count();
        if score > best.map(|(_, s)| s).unwrap_or(0) {
            best = Some((*cat, score));
        }
    }
    best.map(|(c, _)| c)
}

/// Classify `url` into a [`Category`].
pub fn categorize(url: &str) -> Category {
    let domain = extract_domain(url);
    if !domain.is_empty() {
        if let Some(c) = lookup_exact(&domain).or_else(|| lookup_exact(&format!("www.{domain}"))) {
            return c;
        }
        if let Some(c) = lookup_suffix(&domain) {
            return c;
        }
    }
    lookup_keywords(url).unwrap_or(Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_table_hits() {
        assert_eq!(categorize("https://www.reddit.com/r/rust"), Social);
        assert_eq!(categorize("https://github.com/tokio-rs/tokio"), Dev);
        assert_eq!(categorize("https://chatgpt.com/"), Ai);
        assert_eq!(categorize("https://music.youtube.com/watch"), Entertainment);
    }

    #[test]
    fn subdomain_suffix_match() {
        assert_eq!(categorize("https://docs.github.com/x"), Dev);
        assert_eq!(categorize("https://de.wikipedia.org/wiki/Rust"), Reference);
        // "notgithub.com" must not match the "github.com" suffix
        assert_ne!(categorize("https://notgithub.com/"), Dev);
    }

    #[test]
    fn keyword_fallback() {
        assert_eq!(
            categorize("https://random-blog.example/my-shopping-cart-deal"),
            Shopping
        );
        assert_eq!(categorize("https://someplace.example/game-leaderboard"), Gaming);
    }

    #[test]
    fn keyword_ties_prefer_table_order() {
        // "feed" (social) and "news" (news) score 1 each; social comes first.
        assert_eq!(categorize("https://x.example/feed/news"), Social);
    }

    #[test]
    fn unknown_when_nothing_matches() {
        assert_eq!(categorize("https://example.com/"), Unknown);
        assert_eq!(categorize("not a url"), Unknown);
    }

    #[test]
    fn domain_extraction() {
        assert_eq!(extract_domain("https://www.Example.com/a?b"), "example.com");
        assert_eq!(extract_domain("https://sub.example.com"), "sub.example.com");
        assert_eq!(extract_domain("garbage"), "");
    }

    #[test]
    fn internal_pages() {
        assert!(is_internal_url("chrome://extensions"));
        assert!(is_internal_url("about:blank"));
        assert!(!is_internal_url("https://chrome.google.com"));
    }

    #[test]
    fn category_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Ai).unwrap(), "\"ai\"");
        assert_eq!(Productivity.to_string(), "productivity");
    }
}
