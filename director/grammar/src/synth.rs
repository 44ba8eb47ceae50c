use crate::escape::grammar_literal;

/// Intent offered when no world candidate survived retrieval.
pub const INTENT_PLACEHOLDER: &str = "Say";
/// Console command offered when the console block has no candidates.
pub const CONSOLE_PLACEHOLDER: &str = "stat fps";

const GENERIC_JSON: &str = r#"# Generic JSON
value   ::= jstring | jnumber | jobject | jarray | "true" | "false" | "null"
jstring ::= "\"" chars "\""
chars   ::= ( char )*
char    ::= [^"\\\u0000-\u001F] | "\\" ( "\"" | "\\" | "/" | "b" | "f" | "n" | "r" | "t" | "u" hex hex hex hex )
hex     ::= [0-9a-fA-F]
jnumber ::= "-"? int frac? exp?
int     ::= "0" | [1-9] [0-9]*
frac    ::= "." [0-9]+
exp     ::= ( "e" | "E" ) ( "+" | "-" )? [0-9]+
jobject ::= "{" ws ( jmember ( ws "," ws jmember )* )? ws "}"
jmember ::= jstring ws ":" ws value
jarray  ::= "[" ws ( value ( ws "," ws value )* )? ws "]"
ws      ::= ( " " | "\t" | "\r" | "\n" )*
"#;

const ACT_BLOCK: &str = r#"act_root ::= "{" ws "\"tool\"" ws ":" ws "\"world.act\"" ws "," ws "\"act\"" ws ":" ws act_payload ws "}"
act_payload ::= "{" ws "\"commands\"" ws ":" ws "[" ws cmd ( ws "," ws cmd )* ws "]" ws "}"
cmd ::= "{" ws "\"intent\"" ws ":" ws intent cmd_target? cmd_params? cmd_priority? ws "}"
cmd_target ::= ws "," ws "\"target\"" ws ":" ws jstring
cmd_params ::= ws "," ws "\"params\"" ws ":" ws jobject
cmd_priority ::= ws "," ws "\"priority\"" ws ":" ws jnumber
"#;

const CONSOLE_BLOCK: &str = r#"console_root ::= "{" ws "\"tool\"" ws ":" ws "\"console.execute\"" ws "," ws "\"console\"" ws ":" ws console_payload ws "}"
console_payload ::= "{" ws "\"command\"" ws ":" ws command console_args? ws "}"
console_args ::= ws "," ws "\"args\"" ws ":" ws jstring
"#;

/// Builds the grammar for one directive.
///
/// The root offers `console_root` only when console names are present and
/// `act_root` whenever intents are present or both lists are empty, in which
/// case the act block falls back to [`INTENT_PLACEHOLDER`]. Output depends
/// only on the two lists and their order.
#[must_use]
pub fn build_grammar<W, C>(world_intents: &[W], console_names: &[C]) -> String
where
    W: AsRef<str>,
    C: AsRef<str>,
{
    let has_intents = !world_intents.is_empty();
    let has_console = !console_names.is_empty();

    let root = match (has_console, has_intents) {
        (true, true) => "console_root | act_root",
        (true, false) => "console_root",
        (false, _) => "act_root",
    };

    let mut grammar = format!("root ::= {root}\n\n");
    if has_console {
        grammar.push_str(CONSOLE_BLOCK);
        grammar.push_str("command ::= ");
        grammar.push_str(&alternation(console_names, CONSOLE_PLACEHOLDER));
        grammar.push_str("\n\n");
    }
    if has_intents || !has_console {
        grammar.push_str(ACT_BLOCK);
        grammar.push_str("intent ::= ");
        grammar.push_str(&alternation(world_intents, INTENT_PLACEHOLDER));
        grammar.push_str("\n\n");
    }
    grammar.push_str(GENERIC_JSON);
    grammar
}

fn alternation<S: AsRef<str>>(names: &[S], placeholder: &str) -> String {
    if names.is_empty() {
        return grammar_literal(placeholder);
    }
    names
        .iter()
        .map(|name| grammar_literal(name.as_ref()))
        .collect::<Vec<_>>()
        .join(" | ")
}
