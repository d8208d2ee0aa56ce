//! `relay-adapter hooks list`: what the registry would load on start.

use ra_domain::config::Config;
use ra_sessions::StoredHook;

use crate::bootstrap;

pub async fn list(config: Config, json: bool) -> anyhow::Result<()> {
    let (state, _events) = bootstrap::build_adapter_state(config.into()).await?;
    let hooks = state.hooks.list();

    if json {
        println!("{}", serde_json::to_string_pretty(&hooks)?);
    } else {
        print!("{}", render_table(&hooks));
    }
    Ok(())
}

fn render_table(hooks: &[StoredHook]) -> String {
    if hooks.is_empty() {
        return "No hooks registered.\n".into();
    }

    let id_w = width(hooks.iter().map(|h| h.hook_id.len()), "HOOK ID");
    let room_w = width(hooks.iter().map(|h| h.room.len()), "ROOM");
    let skill_w = width(hooks.iter().map(|h| h.skill.len()), "SKILL");

    let mut out = format!(
        "{:id_w$}  {:room_w$}  {:skill_w$}  ONE-SHOT\n",
        "HOOK ID", "ROOM", "SKILL"
    );
    for h in hooks {
        out.push_str(&format!(
            "{:id_w$}  {:room_w$}  {:skill_w$}  {}\n",
            h.hook_id,
            h.room,
            h.skill,
            if h.delete_on_deliver { "yes" } else { "no" }
        ));
    }
    out
}

fn width(lens: impl Iterator<Item = usize>, header: &str) -> usize {
    lens.max().unwrap_or(0).max(header.len())
}
