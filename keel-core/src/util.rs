/// Truncate long SQL for log and error messages.
pub(crate) fn truncate_for_log(sql: &str) -> String {
    const LIMIT: usize = 497;
    if sql.len() > LIMIT {
        let mut end = LIMIT;
        while !sql.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", sql[..end].trim())
    } else {
        sql.trim().to_string()
    }
}
