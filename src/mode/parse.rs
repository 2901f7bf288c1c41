//! Mode string parsing and formatting.

use crate::error::ModeParseError;
use crate::isupport::Isupport;

use super::types::{ModeChange, ModeClass, Sign};

/// Parse a MODE parameter list leniently.
///
/// `modes` is the mode string (`+ov-b`) and `args` the parameters that
/// followed it. Arguments are consumed positionally according to each
/// letter's [`ModeClass`]. Letters the server never declared are passed
/// through without consuming an argument. A letter that needs an argument
/// when none remain gets `None` (for list modes this is a list query).
/// A mode string without a leading sign is treated as `+`.
///
/// ```
/// use slirc_client::isupport::Isupport;
/// use slirc_client::mode::{parse_mode_params, ModeChange};
///
/// let mut caps = Isupport::new();
/// caps.ingest_tokens(["CHANMODES=b,k,l,i", "PREFIX=(ov)@+"]);
/// let changes = parse_mode_params("+ov-b", &["alice", "bob", "*!*@host"], &caps);
/// assert_eq!(changes, vec![
///     ModeChange::plus('o', Some("alice")),
///     ModeChange::plus('v', Some("bob")),
///     ModeChange::minus('b', Some("*!*@host")),
/// ]);
/// ```
pub fn parse_mode_params<S: AsRef<str>>(modes: &str, args: &[S], caps: &Isupport) -> Vec<ModeChange> {
    let mut out = Vec::new();
    // Lenient parsing never errors.
    let _ = parse(modes, args, caps, false, &mut out);
    out
}

/// Parse a MODE parameter list, rejecting undeclared letters and missing
/// arguments (list queries excepted).
pub fn parse_mode_params_strict<S: AsRef<str>>(
    modes: &str,
    args: &[S],
    caps: &Isupport,
) -> Result<Vec<ModeChange>, ModeParseError> {
    let mut out = Vec::new();
    parse(modes, args, caps, true, &mut out)?;
    Ok(out)
}

fn parse<S: AsRef<str>>(
    modes: &str,
    args: &[S],
    caps: &Isupport,
    strict: bool,
    out: &mut Vec<ModeChange>,
) -> Result<(), ModeParseError> {
    let mut args = args.iter().map(AsRef::as_ref);
    let mut sign = Sign::Plus;

    for c in modes.chars() {
        match c {
            '+' => sign = Sign::Plus,
            '-' => sign = Sign::Minus,
            letter => {
                let arg = match caps.mode_class(letter) {
                    Some(class) if class.takes_arg(sign) => match args.next() {
                        Some(arg) => Some(arg.to_owned()),
                        None if strict && class != ModeClass::List => {
                            return Err(ModeParseError::MissingArgument { letter });
                        }
                        None => None,
                    },
                    Some(_) => None,
                    None if strict => return Err(ModeParseError::UnknownModeLetter { letter }),
                    None => None,
                };
                out.push(ModeChange { sign, letter, arg });
            }
        }
    }
    Ok(())
}

/// Format changes as MODE parameters: the mode string followed by arguments.
///
/// Consecutive changes with the same sign share one sign character.
pub fn format_mode_changes(changes: &[ModeChange]) -> Vec<String> {
    let mut modestring = String::new();
    let mut args = Vec::new();
    let mut current = None;
    for change in changes {
        if current != Some(change.sign) {
            modestring.push(change.sign.as_char());
            current = Some(change.sign);
        }
        modestring.push(change.letter);
        args.extend(change.arg.clone());
    }
    let mut params = vec![modestring];
    params.extend(args);
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(tokens: &[&str]) -> Isupport {
        let mut caps = Isupport::new();
        caps.ingest_tokens(tokens.iter().copied());
        caps
    }

    #[test]
    fn test_arity_classes() {
        let caps = caps(&["CHANMODES=b,k,l,imnst", "PREFIX=(ov)@+"]);
        let changes = parse_mode_params("+bklmo-lk", &["mask", "key", "10", "alice", "key"], &caps);
        assert_eq!(
            changes,
            vec![
                ModeChange::plus('b', Some("mask")),
                ModeChange::plus('k', Some("key")),
                ModeChange::plus('l', Some("10")),
                ModeChange::plus('m', None),
                ModeChange::plus('o', Some("alice")),
                ModeChange::minus('l', None),
                ModeChange::minus('k', Some("key")),
            ]
        );
    }

    #[test]
    fn test_list_query_without_arg() {
        let caps = caps(&["CHANMODES=beI,k,l,imnst"]);
        assert_eq!(
            parse_mode_params::<&str>("+b", &[], &caps),
            vec![ModeChange::plus('b', None)]
        );
        assert_eq!(
            parse_mode_params_strict::<&str>("+b", &[], &caps),
            Ok(vec![ModeChange::plus('b', None)])
        );
    }

    #[test]
    fn test_unknown_letter_passes_through() {
        let caps = caps(&["CHANMODES=b,k,l,imnst"]);
        let changes = parse_mode_params("+Zo", &["alice"], &caps);
        assert_eq!(
            changes,
            vec![ModeChange::plus('Z', None), ModeChange::plus('o', Some("alice"))]
        );
        assert_eq!(
            parse_mode_params_strict("+Zo", &["alice"], &caps),
            Err(ModeParseError::UnknownModeLetter { letter: 'Z' })
        );
    }

    #[test]
    fn test_missing_argument() {
        let caps = caps(&[]);
        assert_eq!(
            parse_mode_params::<&str>("+k", &[], &caps),
            vec![ModeChange::plus('k', None)]
        );
        assert_eq!(
            parse_mode_params_strict::<&str>("+k", &[], &caps),
            Err(ModeParseError::MissingArgument { letter: 'k' })
        );
    }

    #[test]
    fn test_no_leading_sign_defaults_to_plus() {
        let caps = caps(&[]);
        assert_eq!(
            parse_mode_params::<&str>("nt", &[], &caps),
            vec![ModeChange::plus('n', None), ModeChange::plus('t', None)]
        );
    }

    #[test]
    fn test_server_specific_prefix_letters() {
        let caps = caps(&["PREFIX=(qaohv)~&@%+", "CHANMODES=beI,k,l,imnstq"]);
        // PREFIX wins: 'q' takes a nick even though CHANMODES lists it as a flag.
        let changes = parse_mode_params("+qh", &["alice", "bob"], &caps);
        assert_eq!(
            changes,
            vec![ModeChange::plus('q', Some("alice")), ModeChange::plus('h', Some("bob"))]
        );
    }

    #[test]
    fn test_format_mode_changes() {
        let changes = vec![
            ModeChange::plus('o', Some("alice")),
            ModeChange::plus('v', Some("bob")),
            ModeChange::minus('b', Some("*!*@host")),
            ModeChange::minus('m', None),
        ];
        assert_eq!(
            format_mode_changes(&changes),
            vec!["+ov-bm", "alice", "bob", "*!*@host"]
        );
    }
}
