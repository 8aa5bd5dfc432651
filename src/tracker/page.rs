//! Page classification used to fill event metadata

/// Where the tracked client currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub path: String,
    pub title: String,
    /// Raw `<meta name="keywords">` content, comma separated
    pub keywords: Option<String>,
}

impl PageContext {
    pub fn new(path: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            keywords: None,
        }
    }

    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = Some(keywords.into());
        self
    }

    /// Section of the dashboard the path belongs to
    pub fn category(&self) -> &'static str {
        let path = self.path.as_str();
        if path.contains("/blog/") {
            "blog"
        } else if path.contains("/products/") {
            "products"
        } else if path.contains("/files") {
            "files"
        } else if path.contains("/analytics") {
            "analytics"
        } else if path.contains("/settings") {
            "settings"
        } else if path.contains("/dashboard") {
            "dashboard"
        } else {
            "other"
        }
    }

    /// Action tags from the path followed by the page keywords
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = ["create", "manage", "settings"]
            .into_iter()
            .filter(|action| self.path.contains(&format!("/{action}")))
            .map(str::to_string)
            .collect();

        if let Some(keywords) = self.keywords.as_deref().filter(|k| !k.is_empty()) {
            tags.extend(keywords.split(',').map(|tag| tag.trim().to_string()));
        }

        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_path() {
        assert_eq!(PageContext::new("/blog/create", "").category(), "blog");
        assert_eq!(PageContext::new("/products/manage", "").category(), "products");
        assert_eq!(PageContext::new("/files", "").category(), "files");
        assert_eq!(PageContext::new("/analytics", "").category(), "analytics");
        assert_eq!(PageContext::new("/settings", "").category(), "settings");
        assert_eq!(PageContext::new("/dashboard", "").category(), "dashboard");
        assert_eq!(PageContext::new("/", "").category(), "other");
        // "/blog" without the trailing slash is not the blog section
        assert_eq!(PageContext::new("/blog", "").category(), "other");
    }

    #[test]
    fn test_tags_from_path_and_keywords() {
        let page = PageContext::new("/blog/create", "New post").with_keywords("rust, web ,cms");
        assert_eq!(page.tags(), vec!["create", "rust", "web", "cms"]);

        let page = PageContext::new("/products/manage/settings", "");
        assert_eq!(page.tags(), vec!["manage", "settings"]);

        assert!(PageContext::new("/", "").tags().is_empty());
    }
}
