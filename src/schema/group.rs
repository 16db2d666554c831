/// Group consecutive rows sharing a key. Input must already be ordered by that key
/// (catalog queries order by schema, object, ordinal), so one pass suffices.
pub fn group_sorted<R, K, F>(rows: Vec<R>, key: F) -> Vec<(K, Vec<R>)>
where
    K: PartialEq,
    F: Fn(&R) -> K,
{
    let mut out: Vec<(K, Vec<R>)> = Vec::new();
    for row in rows {
        let k = key(&row);
        match out.last_mut() {
            Some((last, group)) if *last == k => group.push(row),
            _ => out.push((k, vec![row])),
        }
    }
    out
}
