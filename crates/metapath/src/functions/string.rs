use super::{
    Argument, FunctionLibrary, FunctionResult, FunctionSignature, ItemKind, Occurrence, atomic, atomics,
    boolean, required_atomic, string_arg,
};
use crate::context::{DynamicContext, FN_NS};
use crate::error::MetapathError;
use crate::types::{AtomicItem, Item, Sequence};
use metaschema_node::MetapathNode;
use regex::Regex;

/// `fn:concat` is registered at each of these arities.
const CONCAT_ARITIES: std::ops::RangeInclusive<usize> = 2..=10;

pub(super) fn register<N: MetapathNode>(library: &mut FunctionLibrary<N>) {
    let text = |name: &str| Argument::zero_or_one(name, ItemKind::String);
    let string = (ItemKind::String, Occurrence::One);

    for arity in CONCAT_ARITIES {
        let mut builder = FunctionSignature::builder(FN_NS, "concat");
        for i in 1..=arity {
            builder = builder.argument(Argument::zero_or_one(format!("arg{i}"), ItemKind::AnyAtomic));
        }
        library.register(builder.returns(string.0, string.1).handler(fn_concat));
    }

    library.register(
        FunctionSignature::builder(FN_NS, "string-join")
            .argument(Argument::zero_or_more("arg1", ItemKind::AnyAtomic))
            .returns(string.0, string.1)
            .handler(fn_string_join),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "string-join")
            .argument(Argument::zero_or_more("arg1", ItemKind::AnyAtomic))
            .argument(Argument::one("arg2", ItemKind::String))
            .returns(string.0, string.1)
            .handler(fn_string_join),
    );

    library.register(
        FunctionSignature::builder(FN_NS, "string-length")
            .returns(ItemKind::Integer, Occurrence::One)
            .focus_dependent()
            .handler(fn_string_length),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "string-length")
            .argument(text("arg"))
            .returns(ItemKind::Integer, Occurrence::One)
            .handler(fn_string_length),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "normalize-space")
            .returns(string.0, string.1)
            .focus_dependent()
            .handler(fn_normalize_space),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "normalize-space")
            .argument(text("arg"))
            .returns(string.0, string.1)
            .handler(fn_normalize_space),
    );

    let predicates: [(&str, fn(&str, &str) -> bool); 3] = [
        ("contains", |s, t| s.contains(t)),
        ("starts-with", |s, t| s.starts_with(t)),
        ("ends-with", |s, t| s.ends_with(t)),
    ];
    for (name, test) in predicates {
        library.register(
            FunctionSignature::builder(FN_NS, name)
                .argument(text("arg1"))
                .argument(text("arg2"))
                .returns(ItemKind::Boolean, Occurrence::One)
                .handler(move |args, _, _| {
                    Ok(boolean(test(&string_arg(&args[0])?, &string_arg(&args[1])?)))
                }),
        );
    }

    library.register(
        FunctionSignature::builder(FN_NS, "compare")
            .argument(text("comparand1"))
            .argument(text("comparand2"))
            .returns(ItemKind::Integer, Occurrence::ZeroOrOne)
            .handler(fn_compare),
    );

    library.register(
        FunctionSignature::builder(FN_NS, "substring")
            .argument(text("source"))
            .argument(Argument::one("start", ItemKind::Numeric))
            .returns(string.0, string.1)
            .handler(fn_substring),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "substring")
            .argument(text("source"))
            .argument(Argument::one("start", ItemKind::Numeric))
            .argument(Argument::one("length", ItemKind::Numeric))
            .returns(string.0, string.1)
            .handler(fn_substring),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "substring-before")
            .argument(text("arg1"))
            .argument(text("arg2"))
            .returns(string.0, string.1)
            .handler(fn_substring_before),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "substring-after")
            .argument(text("arg1"))
            .argument(text("arg2"))
            .returns(string.0, string.1)
            .handler(fn_substring_after),
    );

    let case_mappings: [(&str, fn(&str) -> String); 2] =
        [("upper-case", str::to_uppercase), ("lower-case", str::to_lowercase)];
    for (name, mapping) in case_mappings {
        library.register(
            FunctionSignature::builder(FN_NS, name)
                .argument(text("arg"))
                .returns(string.0, string.1)
                .handler(move |args, _, _| {
                    Ok(atomic(AtomicItem::String(mapping(&string_arg(&args[0])?))))
                }),
        );
    }

    library.register(
        FunctionSignature::builder(FN_NS, "matches")
            .argument(text("input"))
            .argument(Argument::one("pattern", ItemKind::String))
            .returns(ItemKind::Boolean, Occurrence::One)
            .handler(fn_matches),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "replace")
            .argument(text("input"))
            .argument(Argument::one("pattern", ItemKind::String))
            .argument(Argument::one("replacement", ItemKind::String))
            .returns(string.0, string.1)
            .handler(fn_replace),
    );
    library.register(
        FunctionSignature::builder(FN_NS, "tokenize")
            .argument(text("input"))
            .argument(Argument::one("pattern", ItemKind::String))
            .returns(ItemKind::String, Occurrence::ZeroOrMore)
            .handler(fn_tokenize),
    );
}

/// The explicit argument, or the string value of the focus for the
/// zero-argument forms.
fn input_string<N: MetapathNode>(
    args: &[Sequence<N>],
    focus: Option<&Item<N>>,
) -> Result<String, MetapathError> {
    match (args.first(), focus) {
        (Some(arg), _) => string_arg(arg),
        (None, Some(item)) => item.string_value(),
        (None, None) => Ok(String::new()),
    }
}

fn compile_pattern(pattern: &str, function: &str) -> Result<Regex, MetapathError> {
    Regex::new(pattern)
        .map_err(|err| MetapathError::function(function, format!("invalid pattern '{pattern}': {err}")))
}

fn fn_concat<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let mut result = String::new();
    for arg in args {
        result.push_str(&string_arg(arg)?);
    }
    Ok(atomic(AtomicItem::String(result)))
}

fn fn_string_join<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let separator = match args.get(1) {
        Some(separator) => string_arg(separator)?,
        None => String::new(),
    };
    let parts: Vec<String> = atomics(&args[0])?.iter().map(AtomicItem::as_string).collect();
    Ok(atomic(AtomicItem::String(parts.join(&separator))))
}

fn fn_string_length<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let length = input_string(args, focus)?.chars().count();
    Ok(atomic(AtomicItem::Integer(
        i64::try_from(length).map_err(|_| MetapathError::Overflow)?,
    )))
}

fn fn_normalize_space<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let input = input_string(args, focus)?;
    let normalized = input.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(atomic(AtomicItem::String(normalized)))
}

/// Codepoint order: -1, 0 or 1, or empty when either side is empty.
fn fn_compare<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    if args[0].is_empty()? || args[1].is_empty()? {
        return Ok(Sequence::empty());
    }
    let ordering = string_arg(&args[0])?.cmp(&string_arg(&args[1])?);
    Ok(atomic(AtomicItem::Integer(ordering as i64)))
}

/// Characters at positions `p` with `round(start) <= p < round(start) +
/// round(length)`, counting from one.
fn fn_substring<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let source = string_arg(&args[0])?;
    let round = |value: AtomicItem| value.as_f64().map_or(f64::NAN, |v| (v + 0.5).floor());
    let start = round(required_atomic(&args[1], "substring")?);
    let end = match args.get(2) {
        Some(length) => start + round(required_atomic(length, "substring")?),
        None => f64::INFINITY,
    };
    let result: String = source
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let position = (*i + 1) as f64;
            position >= start && position < end
        })
        .map(|(_, c)| c)
        .collect();
    Ok(atomic(AtomicItem::String(result)))
}

fn fn_substring_before<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let source = string_arg(&args[0])?;
    let search = string_arg(&args[1])?;
    let result = source
        .find(&search)
        .map(|index| source[..index].to_string())
        .unwrap_or_default();
    Ok(atomic(AtomicItem::String(result)))
}

fn fn_substring_after<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let source = string_arg(&args[0])?;
    let search = string_arg(&args[1])?;
    let result = source
        .find(&search)
        .map(|index| source[index + search.len()..].to_string())
        .unwrap_or_default();
    Ok(atomic(AtomicItem::String(result)))
}

fn fn_matches<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let input = string_arg(&args[0])?;
    let regex = compile_pattern(&string_arg(&args[1])?, "matches")?;
    Ok(boolean(regex.is_match(&input)))
}

fn fn_replace<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let input = string_arg(&args[0])?;
    let regex = compile_pattern(&string_arg(&args[1])?, "replace")?;
    if regex.is_match("") {
        return Err(MetapathError::function(
            "replace",
            "pattern matches a zero-length string",
        ));
    }
    let replacement = replacement_template(&string_arg(&args[2])?, regex.captures_len() - 1)?;
    Ok(atomic(AtomicItem::String(
        regex.replace_all(&input, replacement.as_str()).into_owned(),
    )))
}

/// Translates an XPath replacement string, where `$N` names a group and
/// `\$` and `\\` are escapes, into the `regex` crate's `${N}` syntax.
/// A group number past `groups` expands to nothing.
fn replacement_template(replacement: &str, groups: usize) -> Result<String, MetapathError> {
    let invalid = |detail: &str| {
        MetapathError::function("replace", format!("invalid replacement string '{replacement}': {detail}"))
    };
    let mut template = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('$') => template.push_str("$$"),
                Some('\\') => template.push('\\'),
                _ => return Err(invalid("'\\' must be followed by '$' or '\\'")),
            },
            '$' => {
                let mut digits = String::new();
                while let Some(digit) = chars.next_if(char::is_ascii_digit) {
                    digits.push(digit);
                }
                if digits.is_empty() {
                    return Err(invalid("'$' must be followed by a group number"));
                }
                // longest prefix naming an existing group; the rest is literal
                let mut split = digits.len();
                while split > 1 && !digits[..split].parse::<usize>().is_ok_and(|n| n <= groups) {
                    split -= 1;
                }
                let (group, literal) = digits.split_at(split);
                if let Ok(n) = group.parse::<usize>()
                    && n <= groups
                {
                    template.push_str(&format!("${{{n}}}"));
                }
                template.push_str(literal);
            }
            other => template.push(other),
        }
    }
    Ok(template)
}

fn fn_tokenize<N: MetapathNode>(
    args: &[Sequence<N>],
    _ctx: &DynamicContext<N>,
    _focus: Option<&Item<N>>,
) -> FunctionResult<N> {
    let input = string_arg(&args[0])?;
    let regex = compile_pattern(&string_arg(&args[1])?, "tokenize")?;
    if regex.is_match("") {
        return Err(MetapathError::function(
            "tokenize",
            "pattern matches a zero-length string",
        ));
    }
    if input.is_empty() {
        return Ok(Sequence::empty());
    }
    Ok(Sequence::from_items(
        regex
            .split(&input)
            .map(|token| Item::Atomic(AtomicItem::string(token)))
            .collect(),
    ))
}
