//! Conversation awareness from lightweight heuristics — no extra LLM call.
//!
//! Detects topic, conversation type, key entities, user intent, and the
//! likely referent of bare pronouns, so the system prompt can tell the model
//! what is actually being discussed.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use rotbot_sessions::{Role, Turn};

static TOPIC_KEYWORDS: LazyLock<Vec<(&'static str, Vec<&'static str>)>> = LazyLock::new(|| {
    vec![
        (
            "programming",
            vec![
                "python", "javascript", "java", "code", "function", "class", "variable",
                "error", "bug", "debug", "api", "database", "sql", "html", "css", "react",
                "node", "git", "compile", "runtime", "syntax", "loop", "array", "list",
                "dict", "string", "int", "float", "bool", "import", "module", "package",
                "library", "framework", "server", "client", "http", "json", "typescript",
                "rust", "golang", "c++", "cpp", "ruby", "php", "swift", "kotlin", "django",
                "flask", "docker", "kubernetes", "aws", "azure", "algorithm", "recursion",
                "regex", "exception", "traceback", "stacktrace", "npm", "pip", "cargo",
                "frontend", "backend", "devops", "deploy",
            ],
        ),
        (
            "math",
            vec![
                "equation", "solve", "calculate", "number", "formula", "algebra",
                "calculus", "derivative", "integral", "matrix", "vector", "probability",
                "statistics", "geometry", "trigonometry", "logarithm", "exponent",
                "fraction", "percentage", "graph", "plot", "theorem", "proof",
                "polynomial", "quadratic", "linear", "coefficient", "factorial",
            ],
        ),
        (
            "science",
            vec![
                "experiment", "theory", "hypothesis", "physics", "chemistry", "biology",
                "molecule", "atom", "cell", "dna", "evolution", "gravity", "energy",
                "force", "mass", "velocity", "acceleration", "quantum", "relativity",
                "organism", "ecosystem", "climate", "temperature", "reaction",
            ],
        ),
        (
            "writing",
            vec![
                "essay", "paragraph", "sentence", "grammar", "writing", "story", "poem",
                "article", "blog", "draft", "edit", "proofread", "tone", "narrative",
                "character", "plot", "dialogue", "summary", "outline", "thesis",
                "conclusion", "introduction",
            ],
        ),
        (
            "business",
            vec![
                "marketing", "sales", "revenue", "profit", "startup", "investor",
                "strategy", "management", "customer", "product", "brand", "budget",
                "roi", "kpi", "meeting", "presentation", "proposal", "pitch",
                "linkedin", "resume", "interview", "career", "salary", "negotiation",
            ],
        ),
        (
            "health",
            vec![
                "health", "exercise", "diet", "nutrition", "calories", "workout",
                "sleep", "stress", "anxiety", "depression", "therapy", "medication",
                "symptom", "diagnosis", "doctor", "hospital", "fitness",
            ],
        ),
        (
            "gaming",
            vec![
                "game", "gaming", "fps", "rpg", "mmorpg", "steam", "playstation",
                "xbox", "nintendo", "fortnite", "minecraft", "valorant", "league",
                "multiplayer", "singleplayer", "level", "boss", "quest",
            ],
        ),
        (
            "music",
            vec![
                "song", "music", "album", "artist", "band", "guitar", "piano", "drums",
                "vocals", "lyrics", "melody", "chord", "beat", "genre", "rap", "rock",
                "pop", "jazz", "classical", "playlist", "spotify",
            ],
        ),
    ]
});

static STOP_WORDS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    vec![
        "i", "me", "my", "we", "our", "you", "your", "he", "she", "it", "they", "them",
        "this", "that", "these", "those", "is", "am", "are", "was", "were", "be", "been",
        "being", "have", "has", "had", "do", "does", "did", "will", "would", "could",
        "should", "may", "might", "can", "shall", "must", "a", "an", "the", "and", "or",
        "but", "if", "then", "else", "when", "where", "what", "which", "who", "whom",
        "how", "why", "not", "no", "yes", "so", "than", "too", "very", "just", "also",
        "now", "here", "there", "about", "above", "after", "again", "all", "any",
        "because", "before", "between", "both", "by", "down", "during", "each", "few",
        "for", "from", "further", "get", "got", "go", "going", "into", "its", "let",
        "like", "make", "more", "most", "much", "need", "of", "off", "on", "once",
        "only", "other", "out", "over", "own", "same", "some", "still", "such", "take",
        "tell", "to", "through", "under", "until", "up", "us", "use", "want", "way",
        "well", "with", "ok", "okay", "yeah", "yep", "nope", "sure", "thanks", "thank",
        "please", "hey", "hi", "hello", "bye", "see", "know", "think", "say", "said",
        "really", "thing", "things", "something", "anything", "everything", "nothing",
        "one", "two", "first", "new", "good", "great", "right", "even", "back", "come",
        "came", "give", "gave", "look", "try", "work",
    ]
});

const REFERENCE_PRONOUNS: &[&str] = &["it", "that", "this", "those", "these", "them"];

static INTENT_PATTERNS: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    let rx = |p: &str| Regex::new(p).expect("pattern compiles");
    vec![
        (
            "asking_question",
            vec![
                rx(r"\?$"),
                rx(r"(?i)^(what|how|why|when|where|who|which|can|could|would|is|are|do|does)\b"),
            ],
        ),
        (
            "requesting_help",
            vec![rx(r"(?i)\b(help|assist|fix|solve|explain|show me|teach|guide)\b")],
        ),
        (
            "debugging",
            vec![
                rx(r"(?i)\b(error|bug|issue|problem|broken|doesn'?t work|not working|crash|fail)\b"),
                rx(r"(?i)\b(traceback|exception|stacktrace|undefined|null|NaN)\b"),
            ],
        ),
        (
            "continuing",
            vec![
                rx(r"(?i)^(and|also|another|next|then|now|what about|how about)\b"),
                rx(r"(?i)^(go on|continue|more|keep going|elaborate)\b"),
            ],
        ),
        (
            "casual",
            vec![rx(r"(?i)^(hey|hi|hello|sup|yo|what'?s up|how are you|lol|haha|lmao)\b")],
        ),
        (
            "brainstorming",
            vec![rx(r"(?i)\b(what if|idea|suggest|recommend|alternative|option|brainstorm|could we)\b")],
        ),
        (
            "learning",
            vec![rx(r"(?i)\b(explain|understand|learn|teach|tutorial|example|how does|what does|what is)\b")],
        ),
    ]
});

static DEBUG_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)```|traceback|error:|exception|stacktrace").expect("pattern compiles")
});

static LEARNING_VOCAB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(explain|understand|learn|how does|what is|what does|teach)\b")
        .expect("pattern compiles")
});

static BRAINSTORM_VOCAB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(what if|idea|suggest|brainstorm|could we|alternative)\b")
        .expect("pattern compiles")
});

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z][a-z0-9+#/.]*").expect("pattern compiles"));

/// What the analyzer learned about the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationContext {
    pub topic: Option<String>,
    pub conversation_type: String,
    pub key_entities: Vec<String>,
    pub user_intent: String,
    pub referent: Option<String>,
}

/// Analyze conversation history. Returns `None` for histories shorter than
/// two turns — there is nothing to infer yet.
pub fn analyze_context(history: &[Turn]) -> Option<ConversationContext> {
    if history.len() < 2 {
        return None;
    }
    Some(ConversationContext {
        topic: detect_topic(history),
        conversation_type: detect_conversation_type(history),
        key_entities: extract_key_entities(history),
        user_intent: detect_user_intent(history),
        referent: find_likely_referent(history),
    })
}

fn joined_text(history: &[Turn], last_n: usize) -> String {
    let start = history.len().saturating_sub(last_n);
    history[start..]
        .iter()
        .map(|t| t.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

fn detect_topic(history: &[Turn]) -> Option<String> {
    let text = joined_text(history, 6);
    let words: std::collections::HashSet<String> = tokenize(&text).into_iter().collect();

    let mut best: Option<(&str, usize)> = None;
    for (topic, keywords) in TOPIC_KEYWORDS.iter() {
        let score = keywords.iter().filter(|k| words.contains(**k)).count();
        if score > 0 && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((topic, score));
        }
    }

    match best {
        Some((topic, score)) if score >= 2 => Some(topic.to_string()),
        _ => None,
    }
}

fn detect_conversation_type(history: &[Turn]) -> String {
    let start = history.len().saturating_sub(6);
    let user_msgs: Vec<&str> = history[start..]
        .iter()
        .filter(|t| t.role == Role::User)
        .map(|t| t.content.as_str())
        .collect();
    if user_msgs.is_empty() {
        return "general".to_string();
    }
    let combined = user_msgs.join(" ");

    if DEBUG_MARKERS.is_match(&combined) {
        return "debugging".to_string();
    }

    let question_count = user_msgs.iter().filter(|m| m.contains('?')).count();
    if question_count as f64 >= user_msgs.len() as f64 * 0.6 {
        if LEARNING_VOCAB.is_match(&combined) {
            return "learning".to_string();
        }
        return "Q&A".to_string();
    }

    if BRAINSTORM_VOCAB.is_match(&combined) {
        return "brainstorming".to_string();
    }

    let avg_len =
        user_msgs.iter().map(|m| m.len()).sum::<usize>() as f64 / user_msgs.len() as f64;
    if avg_len < 15.0 {
        return "casual chat".to_string();
    }
    "discussion".to_string()
}

fn extract_key_entities(history: &[Turn]) -> Vec<String> {
    let text = joined_text(history, 4);
    let mut freq: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for word in tokenize(&text) {
        if word.len() < 3 || STOP_WORDS.contains(&word.as_str()) {
            continue;
        }
        let count = freq.entry(word.clone()).or_insert(0);
        if *count == 0 {
            order.push(word);
        }
        *count += 1;
    }

    // Most frequent first; first-seen order breaks ties deterministically.
    let mut ranked: Vec<(String, usize)> = order
        .into_iter()
        .map(|w| {
            let c = freq[&w];
            (w, c)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let entities: Vec<String> = ranked
        .iter()
        .take(8)
        .filter(|(_, c)| *c >= 2)
        .map(|(w, _)| w.clone())
        .collect();
    if entities.len() >= 3 {
        entities
    } else {
        ranked.into_iter().take(5).map(|(w, _)| w).collect()
    }
}

fn last_user_content(history: &[Turn]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|t| t.role == Role::User)
        .map(|t| t.content.as_str())
}

fn detect_user_intent(history: &[Turn]) -> String {
    let Some(text) = last_user_content(history) else {
        return "general".to_string();
    };
    let text = text.trim();
    for (intent, patterns) in INTENT_PATTERNS.iter() {
        if patterns.iter().any(|p| p.is_match(text)) {
            return intent.to_string();
        }
    }
    "general".to_string()
}

fn find_likely_referent(history: &[Turn]) -> Option<String> {
    if history.len() < 2 {
        return None;
    }
    let last = last_user_content(history)?.to_lowercase();
    let words: std::collections::HashSet<String> = tokenize(&last).into_iter().collect();
    let has_reference = REFERENCE_PRONOUNS.iter().any(|p| words.contains(*p));
    if !has_reference {
        return None;
    }

    let prior = &history[..history.len() - 1];
    let start = prior.len().saturating_sub(4);
    extract_key_entities(&prior[start..]).into_iter().next()
}
