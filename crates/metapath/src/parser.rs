//! Metapath grammar, built on `nom`.
//!
//! Precedence, loosest first: `,`, for/let/some/every/if, `or`, `and`,
//! comparisons, `||`, `to`, `+ -`, `* div idiv mod`, `union |`,
//! `intersect except`, `castable as`, `cast as`, unary `- +`, `=>`, `!`,
//! `/ //`, then postfix predicates and lookups.

use crate::ast::*;
use crate::error::MetapathError;
use crate::operators::{ArithmeticOperator, ComparisonOperator};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit0, digit1, multispace1, one_of, satisfy},
    combinator::{map, map_opt, map_res, not, opt, recognize, value},
    error::{Error, ErrorKind},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Function-call-shaped names that introduce other constructs.
const RESERVED_FUNCTION_NAMES: &[&str] = &[
    "array",
    "empty-sequence",
    "function",
    "if",
    "item",
    "map",
    "node",
    "switch",
    "typeswitch",
];

pub fn parse_expression(input: &str) -> Result<Expression, MetapathError> {
    match delimited(skip, expr, skip).parse(input) {
        Ok(("", expr)) => Ok(expr),
        Ok((rest, _)) => Err(MetapathError::syntax(input, unexpected(input, rest))),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            Err(MetapathError::syntax(input, unexpected(input, e.input)))
        }
        Err(nom::Err::Incomplete(_)) => {
            Err(MetapathError::syntax(input, "unexpected end of expression"))
        }
    }
}

fn unexpected(input: &str, rest: &str) -> String {
    if rest.is_empty() {
        return "unexpected end of expression".to_string();
    }
    let offset = input.len() - rest.len();
    let snippet: String = rest.chars().take(20).collect();
    format!("unexpected input at offset {offset}: '{snippet}'")
}

fn error<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Error(Error::new(input, kind)))
}

/// Skips whitespace and `(: ... :)` comments, which may nest.
fn skip(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((value((), multispace1), comment)))).parse(input)
}

fn comment(input: &str) -> IResult<&str, ()> {
    let (mut rest, _) = tag("(:").parse(input)?;
    let mut depth = 1;
    while depth > 0 {
        if let Some(r) = rest.strip_prefix("(:") {
            depth += 1;
            rest = r;
        } else if let Some(r) = rest.strip_prefix(":)") {
            depth -= 1;
            rest = r;
        } else {
            let mut chars = rest.chars();
            if chars.next().is_none() {
                return Err(nom::Err::Failure(Error::new(input, ErrorKind::Eof)));
            }
            rest = chars.as_str();
        }
    }
    Ok((rest, ()))
}

fn ws<'a, F, O>(inner: F) -> impl Parser<&'a str, Output = O, Error = Error<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = Error<&'a str>>,
{
    delimited(skip, inner, skip)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// A keyword that is not the prefix of a longer name.
fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = Error<&'a str>> {
    ws(terminated(tag(word), not(satisfy(is_name_char))))
}

fn expr(input: &str) -> IResult<&str, Expression> {
    let (input, mut items) = separated_list1(ws(char(',')), expr_single).parse(input)?;
    if items.len() == 1 {
        Ok((input, items.remove(0)))
    } else {
        Ok((input, Expression::Sequence(items)))
    }
}

fn expr_single(input: &str) -> IResult<&str, Expression> {
    alt((for_expr, let_expr, quantified_expr, if_expr, or_expr)).parse(input)
}

fn binding<'a, S>(separator: S) -> impl Parser<&'a str, Output = Binding, Error = Error<&'a str>>
where
    S: Parser<&'a str, Output = &'a str, Error = Error<&'a str>>,
{
    map(
        (ws(char('$')), var_name, separator, expr_single),
        |(_, name, _, value)| Binding { name, value },
    )
}

fn for_expr(input: &str) -> IResult<&str, Expression> {
    let (input, _) = keyword("for").parse(input)?;
    let (input, bindings) = separated_list1(ws(char(',')), binding(keyword("in"))).parse(input)?;
    let (input, _) = keyword("return").parse(input)?;
    let (input, body) = expr_single(input)?;
    Ok((
        input,
        Expression::For {
            bindings,
            body: body.boxed(),
        },
    ))
}

fn let_expr(input: &str) -> IResult<&str, Expression> {
    let (input, _) = keyword("let").parse(input)?;
    let (input, bindings) = separated_list1(ws(char(',')), binding(ws(tag(":=")))).parse(input)?;
    let (input, _) = keyword("return").parse(input)?;
    let (input, body) = expr_single(input)?;
    Ok((
        input,
        Expression::Let {
            bindings,
            body: body.boxed(),
        },
    ))
}

fn quantified_expr(input: &str) -> IResult<&str, Expression> {
    let (input, quantifier) = alt((
        value(Quantifier::Some, keyword("some")),
        value(Quantifier::Every, keyword("every")),
    ))
    .parse(input)?;
    let (input, bindings) = separated_list1(ws(char(',')), binding(keyword("in"))).parse(input)?;
    let (input, _) = keyword("satisfies").parse(input)?;
    let (input, satisfies) = expr_single(input)?;
    Ok((
        input,
        Expression::Quantified {
            quantifier,
            bindings,
            satisfies: satisfies.boxed(),
        },
    ))
}

fn if_expr(input: &str) -> IResult<&str, Expression> {
    let (input, _) = keyword("if").parse(input)?;
    let (input, condition) = delimited(ws(char('(')), expr, ws(char(')'))).parse(input)?;
    let (input, _) = keyword("then").parse(input)?;
    let (input, then_branch) = expr_single(input)?;
    let (input, _) = keyword("else").parse(input)?;
    let (input, else_branch) = expr_single(input)?;
    Ok((
        input,
        Expression::If {
            condition: condition.boxed(),
            then_branch: then_branch.boxed(),
            else_branch: else_branch.boxed(),
        },
    ))
}

fn fold_binary(first: Expression, rest: Vec<(BinaryOperator, Expression)>) -> Expression {
    rest.into_iter()
        .fold(first, |left, (op, right)| Expression::binary(op, left, right))
}

fn or_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = and_expr(input)?;
    let (input, rest) =
        many0(pair(value(BinaryOperator::Or, keyword("or")), and_expr)).parse(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn and_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = comparison_expr(input)?;
    let (input, rest) =
        many0(pair(value(BinaryOperator::And, keyword("and")), comparison_expr)).parse(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn comparison_operator(input: &str) -> IResult<&str, BinaryOperator> {
    use BinaryOperator::{General, Value};
    use ComparisonOperator::*;
    alt((
        value(Value(Equal), keyword("eq")),
        value(Value(NotEqual), keyword("ne")),
        value(Value(LessThan), keyword("lt")),
        value(Value(LessOrEqual), keyword("le")),
        value(Value(GreaterThan), keyword("gt")),
        value(Value(GreaterOrEqual), keyword("ge")),
        value(General(NotEqual), ws(tag("!="))),
        value(General(LessOrEqual), ws(tag("<="))),
        value(General(GreaterOrEqual), ws(tag(">="))),
        value(General(Equal), ws(terminated(char('='), not(char('>'))))),
        value(General(LessThan), ws(char('<'))),
        value(General(GreaterThan), ws(char('>'))),
    ))
    .parse(input)
}

fn comparison_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = string_concat_expr(input)?;
    let (input, rest) = opt(pair(comparison_operator, string_concat_expr)).parse(input)?;
    match rest {
        Some((op, right)) => Ok((input, Expression::binary(op, first, right))),
        None => Ok((input, first)),
    }
}

fn string_concat_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = range_expr(input)?;
    let (input, rest) = many0(pair(
        value(BinaryOperator::StringConcat, ws(tag("||"))),
        range_expr,
    ))
    .parse(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn range_expr(input: &str) -> IResult<&str, Expression> {
    let (input, start) = additive_expr(input)?;
    let (input, end) = opt(preceded(keyword("to"), additive_expr)).parse(input)?;
    match end {
        Some(end) => Ok((
            input,
            Expression::Range {
                start: start.boxed(),
                end: end.boxed(),
            },
        )),
        None => Ok((input, start)),
    }
}

fn additive_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = multiplicative_expr(input)?;
    let (input, rest) = many0(pair(
        alt((
            value(
                BinaryOperator::Arithmetic(ArithmeticOperator::Add),
                ws(char('+')),
            ),
            value(
                BinaryOperator::Arithmetic(ArithmeticOperator::Subtract),
                ws(char('-')),
            ),
        )),
        multiplicative_expr,
    ))
    .parse(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn multiplicative_expr(input: &str) -> IResult<&str, Expression> {
    use ArithmeticOperator::*;
    let (input, first) = union_expr(input)?;
    let (input, rest) = many0(pair(
        alt((
            value(BinaryOperator::Arithmetic(Multiply), ws(char('*'))),
            value(BinaryOperator::Arithmetic(Divide), keyword("div")),
            value(BinaryOperator::Arithmetic(IntegerDivide), keyword("idiv")),
            value(BinaryOperator::Arithmetic(Modulo), keyword("mod")),
        )),
        union_expr,
    ))
    .parse(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn union_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = intersect_except_expr(input)?;
    let (input, rest) = many0(pair(
        value(
            BinaryOperator::Union,
            alt((keyword("union"), ws(terminated(tag("|"), not(char('|')))))),
        ),
        intersect_except_expr,
    ))
    .parse(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn intersect_except_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = castable_expr(input)?;
    let (input, rest) = many0(pair(
        alt((
            value(BinaryOperator::Intersect, keyword("intersect")),
            value(BinaryOperator::Except, keyword("except")),
        )),
        castable_expr,
    ))
    .parse(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn single_type(input: &str) -> IResult<&str, (EQName, bool)> {
    let (input, name) = ws(eqname).parse(input)?;
    let (input, optional) = opt(ws(char('?'))).parse(input)?;
    Ok((input, (name, optional.is_some())))
}

fn castable_expr(input: &str) -> IResult<&str, Expression> {
    let (input, expr) = cast_expr(input)?;
    let (input, target) =
        opt(preceded((keyword("castable"), keyword("as")), single_type)).parse(input)?;
    match target {
        Some((type_name, allow_empty)) => Ok((
            input,
            Expression::Castable {
                expr: expr.boxed(),
                type_name,
                allow_empty,
            },
        )),
        None => Ok((input, expr)),
    }
}

fn cast_expr(input: &str) -> IResult<&str, Expression> {
    let (input, expr) = unary_expr(input)?;
    let (input, target) =
        opt(preceded((keyword("cast"), keyword("as")), single_type)).parse(input)?;
    match target {
        Some((type_name, allow_empty)) => Ok((
            input,
            Expression::Cast {
                expr: expr.boxed(),
                type_name,
                allow_empty,
            },
        )),
        None => Ok((input, expr)),
    }
}

fn unary_expr(input: &str) -> IResult<&str, Expression> {
    let (input, signs) = many0(ws(one_of("-+"))).parse(input)?;
    let (input, expr) = arrow_expr(input)?;
    let negations = signs.iter().filter(|&&c| c == '-').count();
    if negations % 2 == 1 {
        Ok((input, Expression::Negate(expr.boxed())))
    } else {
        Ok((input, expr))
    }
}

/// `base => f(args)` is the call `f(base, args)`.
fn arrow_expr(input: &str) -> IResult<&str, Expression> {
    let (input, base) = simple_map_expr(input)?;
    let (input, calls) =
        many0(preceded(ws(tag("=>")), pair(ws(eqname), argument_list))).parse(input)?;
    let result = calls.into_iter().fold(base, |base, (name, rest)| {
        let mut arguments = Vec::with_capacity(rest.len() + 1);
        arguments.push(base);
        arguments.extend(rest);
        Expression::FunctionCall(FunctionCall { name, arguments })
    });
    Ok((input, result))
}

fn simple_map_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = path_expr(input)?;
    let (input, rest) =
        many0(preceded(ws(terminated(char('!'), not(char('=')))), path_expr)).parse(input)?;
    let result = rest
        .into_iter()
        .fold(first, |left, right| Expression::SimpleMap {
            left: left.boxed(),
            right: right.boxed(),
        });
    Ok((input, result))
}

fn path_expr(input: &str) -> IResult<&str, Expression> {
    if let Ok((rest, _)) = ws(tag::<_, _, Error<&str>>("//")).parse(input) {
        let (rest, path) = relative_path(rest)?;
        return Ok((rest, Expression::RootDescendantPath(path.boxed())));
    }
    if let Ok((rest, _)) = ws(char::<_, Error<&str>>('/')).parse(input) {
        return match relative_path(rest) {
            Ok((rest, path)) => Ok((rest, Expression::RootPath(path.boxed()))),
            Err(nom::Err::Error(_)) => Ok((rest, Expression::Root)),
            Err(e) => Err(e),
        };
    }
    relative_path(input)
}

fn relative_path(input: &str) -> IResult<&str, Expression> {
    let (mut input, mut left) = step_expr(input)?;
    loop {
        if let Ok((rest, _)) = ws(tag::<_, _, Error<&str>>("//")).parse(input) {
            let (rest, right) = step_expr(rest)?;
            left = Expression::DescendantPath {
                left: left.boxed(),
                right: right.boxed(),
            };
            input = rest;
        } else if let Ok((rest, _)) = ws(char::<_, Error<&str>>('/')).parse(input) {
            let (rest, right) = step_expr(rest)?;
            left = Expression::Path {
                left: left.boxed(),
                right: right.boxed(),
            };
            input = rest;
        } else {
            return Ok((input, left));
        }
    }
}

fn step_expr(input: &str) -> IResult<&str, Expression> {
    alt((postfix_expr, axis_step)).parse(input)
}

fn with_predicates(base: Expression, predicates: Vec<Expression>) -> Expression {
    if predicates.is_empty() {
        base
    } else {
        Expression::Filter {
            base: base.boxed(),
            predicates,
        }
    }
}

fn axis_step(input: &str) -> IResult<&str, Expression> {
    let (input, step) = alt((
        value(
            Step {
                axis: Axis::Parent,
                test: NodeTest::AnyKind,
            },
            ws(tag("..")),
        ),
        map(
            pair(
                map_opt(ws(terminated(nc_name, tag("::"))), Axis::from_name),
                node_test,
            ),
            |(axis, test)| Step { axis, test },
        ),
        map(preceded(ws(char('@')), node_test), |test| Step {
            axis: Axis::Flag,
            test,
        }),
        map(node_test, |test| Step {
            axis: Axis::Child,
            test,
        }),
    ))
    .parse(input)?;
    let (input, predicates) = many0(predicate).parse(input)?;
    Ok((input, with_predicates(Expression::Step(step), predicates)))
}

fn node_test(input: &str) -> IResult<&str, NodeTest> {
    ws(alt((
        value(
            NodeTest::AnyKind,
            (tag("node"), ws(char('(')), char(')')),
        ),
        value(NodeTest::Wildcard, char('*')),
        map(eqname, NodeTest::Name),
    )))
    .parse(input)
}

enum Postfix {
    Predicate(Expression),
    Lookup(LookupKey),
}

fn postfix_expr(input: &str) -> IResult<&str, Expression> {
    let (input, base) = primary_expr(input)?;
    let (input, postfixes) = many0(alt((
        map(predicate, Postfix::Predicate),
        map(lookup, Postfix::Lookup),
    )))
    .parse(input)?;

    let mut result = base;
    for postfix in postfixes {
        result = match (postfix, result) {
            (Postfix::Predicate(p), Expression::Filter { base, mut predicates }) => {
                predicates.push(p);
                Expression::Filter { base, predicates }
            }
            (Postfix::Predicate(p), base) => Expression::Filter {
                base: base.boxed(),
                predicates: vec![p],
            },
            (Postfix::Lookup(key), base) => Expression::Lookup {
                base: base.boxed(),
                key,
            },
        };
    }
    Ok((input, result))
}

fn predicate(input: &str) -> IResult<&str, Expression> {
    delimited(ws(char('[')), expr, ws(char(']'))).parse(input)
}

fn lookup(input: &str) -> IResult<&str, LookupKey> {
    preceded(ws(char('?')), key_specifier).parse(input)
}

fn key_specifier(input: &str) -> IResult<&str, LookupKey> {
    ws(alt((
        value(LookupKey::Wildcard, char('*')),
        map(map_res(digit1, i64::from_str), LookupKey::Integer),
        map(nc_name, |name| LookupKey::Name(name.to_string())),
        map(delimited(ws(char('(')), expr, ws(char(')'))), |e| {
            LookupKey::Expression(e.boxed())
        }),
    )))
    .parse(input)
}

fn primary_expr(input: &str) -> IResult<&str, Expression> {
    ws(alt((
        map(numeric_literal, Expression::Literal),
        map(string_literal, |s| Expression::Literal(Literal::String(s))),
        map(preceded(char('$'), var_name), Expression::Variable),
        parenthesized_expr,
        map_constructor,
        curly_array_constructor,
        square_array_constructor,
        function_call,
        map(lookup, Expression::UnaryLookup),
        context_item,
    )))
    .parse(input)
}

fn context_item(input: &str) -> IResult<&str, Expression> {
    let (rest, _) = char('.').parse(input)?;
    if rest.starts_with('.') {
        return error(input, ErrorKind::Verify);
    }
    Ok((rest, Expression::ContextItem))
}

fn parenthesized_expr(input: &str) -> IResult<&str, Expression> {
    let (input, inner) = delimited(
        terminated(char('('), not(char(':'))),
        opt(expr),
        ws(char(')')),
    )
    .parse(input)?;
    Ok((input, inner.unwrap_or(Expression::Sequence(Vec::new()))))
}

fn map_constructor(input: &str) -> IResult<&str, Expression> {
    let (input, _) = keyword("map").parse(input)?;
    let (input, entries) = delimited(
        ws(char('{')),
        separated_list0(
            ws(char(',')),
            map((expr_single, ws(char(':')), expr_single), |(k, _, v)| (k, v)),
        ),
        ws(char('}')),
    )
    .parse(input)?;
    Ok((input, Expression::Map(entries)))
}

fn curly_array_constructor(input: &str) -> IResult<&str, Expression> {
    let (input, _) = keyword("array").parse(input)?;
    let (input, inner) = delimited(ws(char('{')), opt(expr), ws(char('}'))).parse(input)?;
    Ok((input, Expression::CurlyArray(inner.map(Expression::boxed))))
}

fn square_array_constructor(input: &str) -> IResult<&str, Expression> {
    let (input, members) = delimited(
        ws(char('[')),
        separated_list0(ws(char(',')), expr_single),
        ws(char(']')),
    )
    .parse(input)?;
    Ok((input, Expression::SquareArray(members)))
}

fn argument_list(input: &str) -> IResult<&str, Vec<Expression>> {
    delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), expr_single),
        ws(char(')')),
    )
    .parse(input)
}

fn function_call(input: &str) -> IResult<&str, Expression> {
    let (rest, name) = eqname(input)?;
    if name.prefix.is_none() && RESERVED_FUNCTION_NAMES.contains(&name.local.as_str()) {
        return error(input, ErrorKind::Verify);
    }
    let (rest, arguments) = argument_list(rest)?;
    Ok((rest, Expression::FunctionCall(FunctionCall { name, arguments })))
}

fn numeric_literal(input: &str) -> IResult<&str, Literal> {
    let (rest, text) = recognize((
        alt((
            recognize((digit1, opt((char('.'), digit0)))),
            recognize((char('.'), digit1)),
        )),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input)?;
    if rest.starts_with(is_name_start) {
        return error(input, ErrorKind::Verify);
    }

    let mut normalized = String::with_capacity(text.len() + 2);
    if text.starts_with('.') {
        normalized.push('0');
    }
    for (i, c) in text.char_indices() {
        normalized.push(c);
        let next = text[i + c.len_utf8()..].chars().next();
        if c == '.' && !next.is_some_and(|n| n.is_ascii_digit()) {
            normalized.push('0');
        }
    }

    let literal = if normalized.contains(['e', 'E']) {
        normalized.parse::<f64>().ok().map(Literal::Double)
    } else if normalized.contains('.') {
        Decimal::from_str(&normalized).ok().map(Literal::Decimal)
    } else {
        match normalized.parse::<i64>() {
            Ok(i) => Some(Literal::Integer(i)),
            Err(_) => Decimal::from_str(&normalized).ok().map(Literal::Decimal),
        }
    };
    match literal {
        Some(literal) => Ok((rest, literal)),
        None => Err(nom::Err::Failure(Error::new(input, ErrorKind::Float))),
    }
}

/// A quoted string; the quote character is escaped by doubling it.
fn string_literal(input: &str) -> IResult<&str, String> {
    let quote = match input.chars().next() {
        Some(q @ ('\'' | '"')) => q,
        _ => return error(input, ErrorKind::Char),
    };
    let mut text = String::new();
    let mut rest = &input[1..];
    loop {
        let Some(end) = rest.find(quote) else {
            return Err(nom::Err::Failure(Error::new(input, ErrorKind::Char)));
        };
        text.push_str(&rest[..end]);
        rest = &rest[end + 1..];
        match rest.strip_prefix(quote) {
            Some(after) => {
                text.push(quote);
                rest = after;
            }
            None => return Ok((rest, text)),
        }
    }
}

fn var_name(input: &str) -> IResult<&str, String> {
    map(recognize(pair(nc_name, opt(pair(char(':'), nc_name)))), str::to_string).parse(input)
}

fn eqname(input: &str) -> IResult<&str, EQName> {
    let (input, first) = nc_name(input)?;
    let (input, second) = opt(preceded(char(':'), nc_name)).parse(input)?;
    Ok((
        input,
        match second {
            Some(local) => EQName::new(Some(first), local),
            None => EQName::new(None, first),
        },
    ))
}

fn nc_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(is_name_start),
        nom::bytes::complete::take_while(is_name_char),
    ))
    .parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Expression {
        parse_expression(text).unwrap()
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("42"), Expression::Literal(Literal::Integer(42)));
        assert_eq!(
            parse("1.5"),
            Expression::Literal(Literal::Decimal(Decimal::from_str("1.5").unwrap()))
        );
        assert_eq!(
            parse(".5"),
            Expression::Literal(Literal::Decimal(Decimal::from_str("0.5").unwrap()))
        );
        assert_eq!(parse("1e3"), Expression::Literal(Literal::Double(1000.0)));
        assert_eq!(
            parse("'it''s'"),
            Expression::Literal(Literal::String("it's".into()))
        );
        assert_eq!(
            parse("\"say \"\"hi\"\"\""),
            Expression::Literal(Literal::String("say \"hi\"".into()))
        );
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse("1 + 2 * 3");
        assert_eq!(expr.to_string(), "(1 + (2 * 3))");

        let expr = parse("1 - 2 - 3");
        assert_eq!(expr.to_string(), "((1 - 2) - 3)");

        let expr = parse("$a = 1 or $b eq 2 and true()");
        assert_eq!(expr.to_string(), "(($a = 1) or (($b eq 2) and true()))");
    }

    #[test]
    fn test_parse_paths() {
        assert_eq!(parse("/").kind_name(), "root-slash-only");
        assert_eq!(parse("/catalog/group").to_string(), "/catalog/group");
        assert_eq!(parse("//control[@id = 'ac-1']").kind_name(), "root-double-slash-path");
        assert_eq!(parse("group//control").kind_name(), "relative-double-slash-path");
        assert_eq!(parse("ancestor::group").to_string(), "ancestor::group");
        assert_eq!(parse("../title").to_string(), "../title");
        assert_eq!(parse("child::*").to_string(), "*");
        assert_eq!(parse("self::node()").to_string(), ".");
        assert_eq!(parse("prop[@name='label']/@value").to_string(), "prop[(@name = 'label')]/@value");
    }

    #[test]
    fn test_parse_function_calls() {
        let Expression::FunctionCall(call) = parse("fn:count(a, 'x')") else {
            panic!("expected a function call");
        };
        assert_eq!(call.name.prefix.as_deref(), Some("fn"));
        assert_eq!(call.name.local, "count");
        assert_eq!(call.arguments.len(), 2);

        assert_eq!(parse("upper-case('a')").kind_name(), "function-call");
        assert_eq!(parse("'a' => upper-case()").to_string(), "upper-case('a')");
    }

    #[test]
    fn test_parse_flwor_and_conditionals() {
        assert_eq!(parse("for $i in 1 to 3 return $i * 2").kind_name(), "for");
        let Expression::Let { bindings, .. } = parse("let $x := 3, $y := 4 return $x + $y") else {
            panic!("expected let");
        };
        assert_eq!(bindings.len(), 2);
        assert_eq!(parse("if (a) then 1 else 2").kind_name(), "if");
        assert_eq!(
            parse("every $x in (1, 2) satisfies $x > 0").kind_name(),
            "quantified"
        );
    }

    #[test]
    fn test_parse_constructors_and_lookups() {
        assert_eq!(parse("(1, 2, 3) ! (. * 2)").kind_name(), "simple-map");
        assert_eq!(parse("[1, (2, 3)]").kind_name(), "array-square-constructor");
        assert_eq!(parse("array { }"), Expression::CurlyArray(None));
        assert_eq!(parse("map { 'a': 1, 'b': 2 }").to_string(), "map {'a': 1, 'b': 2}");
        assert_eq!(parse("$m?name").to_string(), "$m?name");
        assert_eq!(parse("$a?2").to_string(), "$a?2");
        assert_eq!(parse("?*").kind_name(), "unary-lookup");
        assert_eq!(parse("()"), Expression::Sequence(Vec::new()));
    }

    #[test]
    fn test_parse_keyword_boundaries() {
        // names that start with operator keywords are plain steps
        assert_eq!(parse("order").to_string(), "order");
        assert_eq!(parse("android/modular").to_string(), "android/modular");
        assert_eq!(parse("a-b").to_string(), "a-b");
        assert_eq!(parse("$x idiv 2").to_string(), "($x idiv 2)");
        assert_eq!(parse("'a' || 'b'").to_string(), "('a' || 'b')");
        assert_eq!(parse("a | b").to_string(), "(a union b)");
    }

    #[test]
    fn test_parse_cast() {
        let Expression::Cast {
            type_name,
            allow_empty,
            ..
        } = parse("'1' cast as integer?")
        else {
            panic!("expected cast");
        };
        assert_eq!(type_name.local, "integer");
        assert!(allow_empty);
        assert_eq!(parse("'x' castable as meta:date").kind_name(), "castable");
    }

    #[test]
    fn test_parse_comments_and_negation() {
        assert_eq!(parse("(: note (: nested :) :) 1 + 1").to_string(), "(1 + 1)");
        assert_eq!(parse("--1"), Expression::Literal(Literal::Integer(1)));
        assert_eq!(parse("-1").kind_name(), "negate");
    }

    #[test]
    fn test_parse_errors() {
        for text in ["1 +", "(1, 2", "'open", "a[1", "1 2", "(: open"] {
            let err = parse_expression(text).unwrap_err();
            assert!(matches!(err, MetapathError::Syntax { .. }), "{text}: {err:?}");
            assert!(err.is_static());
        }
    }
}
