use std::path::Path;

use hearth_mutation::fetch_list;

use super::{fail, list_key, print_json, render_page, Session};
use crate::OutputFormat;

pub(crate) async fn cmd_fetch(
    config_path: &Path,
    entity: &str,
    params: &[(String, String)],
    output: OutputFormat,
    quiet: bool,
) {
    let session = Session::open(config_path).unwrap_or_else(|e| fail(&e, output, quiet));
    let config = session
        .entity(entity)
        .unwrap_or_else(|e| fail(&e, output, quiet));
    let key = list_key(entity, params);

    let page = match fetch_list(session.store.as_ref(), session.transport.as_ref(), config, &key).await
    {
        Ok(page) => page,
        Err(e) => fail(&format!("fetch {} failed: {}", key, e), output, quiet),
    };

    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => print!("{}", render_page(&key.to_string(), &page)),
        OutputFormat::Json => print_json(&page.to_json()),
    }
}
