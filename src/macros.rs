/// Lazily compiled `&'static Regex` for a literal pattern.
#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: $crate::__private::Lazy<$crate::__private::Regex> =
            $crate::__private::Lazy::new(|| $crate::__private::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Build an [`FnRule`](crate::FnRule) from a regex or a predicate.
///
/// ```
/// use templar::{ValueRestriction, mask_rule};
///
/// let number = mask_rule! {
///     name: "number",
///     mask: 'n',
///     restriction: ValueRestriction::NUMERIC,
///     regex: r"^\d+$",
/// };
/// let short = mask_rule! {
///     name: "short",
///     mask: 's',
///     pred: |s| s.len() < 3,
/// };
/// # let _ = (number, short);
/// ```
#[macro_export]
macro_rules! mask_rule {
    (
        name: $name:expr,
        mask: $mask:expr,
        $(restriction: $restriction:expr,)?
        regex: $pat:literal
        $(,)?
    ) => {{
        $crate::FnRule::new($name, $mask, $crate::Matcher::Regex($crate::regex!($pat)))
            $(.with_restriction($restriction))?
    }};
    (
        name: $name:expr,
        mask: $mask:expr,
        $(restriction: $restriction:expr,)?
        pred: $pred:expr
        $(,)?
    ) => {{
        $crate::FnRule::new($name, $mask, $crate::Matcher::predicate($pred))
            $(.with_restriction($restriction))?
    }};
}
