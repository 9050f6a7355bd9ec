use super::{ProcessCandidate, WindowCandidate};
use crate::config::LocatorConfig;

/// Name and geometry rules that decide whether a window or process is the target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetMatcher {
    process_names: Vec<String>,
    title_needles: Vec<String>,
    title_keywords: Vec<String>,
    window_classes: Vec<String>,
    decoys: Vec<String>,
    min_size: (i32, i32),
    max_size: (i32, i32),
}

fn lowered(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).filter(|s| !s.is_empty()).collect()
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}

impl TargetMatcher {
    pub fn from_config(cfg: &LocatorConfig) -> Self {
        Self {
            process_names: lowered(&cfg.process_names),
            title_needles: lowered(&cfg.title_needles),
            title_keywords: lowered(&cfg.title_keywords),
            window_classes: lowered(&cfg.window_classes),
            decoys: lowered(&cfg.decoys),
            min_size: (cfg.min_width, cfg.min_height),
            max_size: (cfg.max_width, cfg.max_height),
        }
    }

    /// Launchers, browsers and shell windows that share part of the target's name.
    pub fn is_decoy(&self, w: &WindowCandidate) -> bool {
        let title = w.title.to_lowercase();
        let class = w.class_name.to_lowercase();
        contains_any(&title, &self.decoys) || contains_any(&class, &self.decoys)
    }

    /// Title/class identity check, ignoring geometry.
    pub fn matches_identity(&self, w: &WindowCandidate) -> bool {
        if w.title.trim().is_empty() || self.is_decoy(w) {
            return false;
        }
        let class = w.class_name.to_lowercase();
        if self.window_classes.iter().any(|c| *c == class) {
            return true;
        }
        let title = w.title.to_lowercase();
        contains_any(&title, &self.title_needles) && contains_any(&title, &self.title_keywords)
    }

    /// Visible, not minimized, within the size bounds, with a non-empty client area.
    pub fn has_game_geometry(&self, w: &WindowCandidate) -> bool {
        let (width, height) = (w.rect.width(), w.rect.height());
        w.visible
            && !w.iconic
            && (self.min_size.0..=self.max_size.0).contains(&width)
            && (self.min_size.1..=self.max_size.1).contains(&height)
            && !w.client.is_empty()
    }

    pub fn accepts_window(&self, w: &WindowCandidate) -> bool {
        self.matches_identity(w) && self.has_game_geometry(w)
    }

    pub fn accepts_process(&self, p: &ProcessCandidate) -> bool {
        contains_any(&p.image_name.to_lowercase(), &self.process_names)
    }
}
