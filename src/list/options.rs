use super::dispatch::ChangeSource;
use crate::core::Attributes;
use serde_json::Value;

/// Options accepted by every mutating list call.
///
/// `index` is only honored by add; `src` defaults per operation (reset
/// uses [`ChangeSource::Reset`]). Entries in `extra` are copied into the
/// change event so subscribers can read them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeOptions {
    pub silent: bool,
    pub index: Option<usize>,
    pub src: Option<ChangeSource>,
    pub extra: Attributes,
}

impl ChangeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `ChangeOptions::new().silent(true)`.
    pub fn silently() -> Self {
        Self::new().silent(true)
    }

    /// Skip both notification phases.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Explicit insertion index for add; clamped to the list length.
    pub fn index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn src(mut self, src: ChangeSource) -> Self {
        self.src = Some(src);
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let options = ChangeOptions::new()
            .index(2)
            .src(ChangeSource::Custom("import".into()))
            .extra("batch", 7);
        assert!(!options.silent);
        assert_eq!(options.index, Some(2));
        assert_eq!(options.extra["batch"], json!(7));
        assert!(ChangeOptions::silently().silent);
    }
}
