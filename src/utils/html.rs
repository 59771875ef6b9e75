// src/utils/html.rs

/// Sanitizes admin-entered text (quiz titles, descriptions, question and
/// option labels) with ammonia and trims the result.
///
/// Safe inline markup such as `<b>` survives; `<script>` and its content,
/// event-handler attributes and similar are stripped. Participant names are
/// not passed through here: they are plain text and only trimmed.
pub fn clean_text(input: &str) -> String {
    ammonia::clean(input.trim()).trim().to_string()
}
