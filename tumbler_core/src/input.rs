use std::borrow::Cow;

/// One candidate test case, fed to the target on its standard input.
///
/// Inputs have no identity beyond their bytes. Mutators never modify an
/// input in place; they build a fresh one through `From<Vec<u8>>`.
pub trait Input: Clone + Send + Sync + std::fmt::Debug + From<Vec<u8>> + 'static {
    fn as_bytes(&self) -> &[u8];
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool;

    /// Renders the input for humans. Invalid UTF-8 is replaced, not rejected.
    fn to_lossy_string(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl Input for Vec<u8> {
    fn as_bytes(&self) -> &[u8] {
        self.as_slice()
    }
    fn len(&self) -> usize {
        self.len()
    }
    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_u8_impl_input() {
        let data: Vec<u8> = b"<a>".to_vec();
        let empty_data: Vec<u8> = vec![];
        assert_eq!(data.as_bytes(), b"<a>");
        assert_eq!(Input::len(&data), 3);
        assert!(!Input::is_empty(&data));
        assert!(Input::is_empty(&empty_data));
    }

    #[test]
    fn lossy_string_replaces_invalid_utf8() {
        let data: Vec<u8> = vec![b'o', b'k', 0xFF];
        assert_eq!(data.to_lossy_string(), "ok\u{FFFD}");
    }
}
