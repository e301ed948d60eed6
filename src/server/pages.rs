//! Server-rendered HTML: the public listening page and the admin pages.
//!
//! Pages are small and self-contained. Forms post to the JSON API with a few
//! lines of inline script; everything else is plain markup.

use axum::extract::{Path, RawQuery, State};
use axum::response::{Html, IntoResponse, Response};
use chrono::Utc;
use tracing::warn;

use super::api::{parse_id, parse_list_query};
use super::gate::AdminIdentity;
use super::AppState;
use crate::meditation::{ListQuery, MeditationView, SortOrder, tag_universe};
use crate::playback::Scrubber;

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:48rem;margin:0 auto;padding:1.5rem;color:#27272a}\
a{color:inherit}.muted{color:#71717a;font-size:.875rem}.tag{display:inline-block;border:1px solid #d4d4d8;border-radius:999px;padding:.1rem .6rem;margin:.1rem;font-size:.8rem;text-decoration:none}\
.tag.on{background:#27272a;color:#fff}.card{border:1px solid #e4e4e7;border-radius:.75rem;padding:1rem;margin:.75rem 0}\
.err{color:#dc2626}input,textarea{display:block;width:100%;margin:.25rem 0 .75rem;padding:.4rem}";

const LOGOUT_SCRIPT: &str = "<script>async function logout(){await fetch('/api/admin/logout',{method:'POST'});location.href='/admin/login';}</script>";

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\
<title>{}</title><style>{STYLE}</style></head><body>{body}</body></html>",
        escape(title)
    ))
}

fn admin_page(title: &str, who: &AdminIdentity, body: &str) -> Html<String> {
    let email = who.0.email.as_deref().unwrap_or("");
    let header = format!(
        "<header><p class=\"muted\">Hello, <strong>{}</strong> <button onclick=\"logout()\">Log out</button></p></header>{LOGOUT_SCRIPT}",
        escape(email)
    );
    page(title, &format!("{header}<main>{body}</main><footer class=\"muted\">Meditations Admin</footer>"))
}

fn tags_html(tags: &[String]) -> String {
    tags.iter().map(|t| format!("<span class=\"tag\">{}</span>", escape(t))).collect()
}

/// Player markup. The time labels start from a fresh `Scrubber`; `PLAYER_SCRIPT`
/// keeps them current in the browser.
fn audio_html(view: &MeditationView) -> String {
    let scrubber = Scrubber::new();
    match &view.audio_url {
        Some(url) => format!(
            "<div class=\"player\"><audio controls preload=\"metadata\" src=\"{u}\"></audio> \
<span class=\"muted\"><span class=\"elapsed\">{}</span> / <span class=\"total\">{}</span></span> \
<a href=\"{u}\" download>Download</a></div>",
            scrubber.elapsed_label(),
            scrubber.total_label(),
            u = escape(url)
        ),
        None => "<p class=\"muted\">Audio unavailable.</p>".to_string(),
    }
}

pub async fn home(State(state): State<AppState>) -> Response {
    let body = match state.repo.today(Utc::now()).await {
        Ok((_, Some(view))) => {
            let quote = view
                .meditation
                .quote
                .as_deref()
                .map(|q| format!("<blockquote>{}</blockquote>", escape(q)))
                .unwrap_or_default();
            format!(
                "<h1>{}</h1>{quote}{}<p>{}</p>{PLAYER_SCRIPT}",
                escape(&view.meditation.title),
                audio_html(&view),
                tags_html(&view.meditation.tags)
            )
        }
        Ok((_, None)) => "<h1>Today's meditation</h1><p class=\"muted\">No meditation for today yet. Check back soon.</p>".to_string(),
        Err(e) => {
            warn!(target: "pages", "today lookup failed: {e}");
            "<h1>Today's meditation</h1><p class=\"err\">Could not load today's meditation.</p>".to_string()
        }
    };
    page("Today's meditation", &body).into_response()
}

const UPLOAD_FORM: &str = r#"<h1>Upload a meditation</h1>
<form id="upload"><label>Title<input name="title" required></label>
<label>Quote<textarea name="quote"></textarea></label>
<label>Tags (comma separated)<input name="tags"></label>
<label>Audio<input type="file" name="file" accept="audio/*" required></label>
<button>Upload</button> <span id="msg"></span></form>
<script>document.getElementById('upload').addEventListener('submit',async e=>{e.preventDefault();const m=document.getElementById('msg');m.textContent='Uploading…';
const r=await fetch('/api/admin/upload',{method:'POST',body:new FormData(e.target)});const j=await r.json().catch(()=>({}));
if(r.ok){m.textContent='Uploaded.';e.target.reset();}else{m.textContent=j.error||'Upload failed';m.className='err';}});</script>
<p><a href="/admin/meditations">View all meditations</a></p>"#;

pub async fn dashboard(who: AdminIdentity) -> Html<String> {
    admin_page("Admin", &who, UPLOAD_FORM)
}

fn list_href(q: &ListQuery) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !q.search.is_empty() { parts.push(format!("q={}", urlencoding::encode(&q.search))); }
    for t in &q.tags { parts.push(format!("tag={}", urlencoding::encode(t))); }
    if q.sort != SortOrder::Newest { parts.push("sort=oldest".to_string()); }
    if parts.is_empty() { "/admin/meditations".to_string() } else { format!("/admin/meditations?{}", parts.join("&")) }
}

/// Browser side of `PlaybackSlot` and `Scrubber`: one audio element plays at a
/// time, and each player's labels follow its position in `m:ss`.
const PLAYER_SCRIPT: &str = "<script>let current=null;\
const fmt=s=>{if(!isFinite(s)||s<0)s=0;s=Math.floor(s);return Math.floor(s/60)+':'+String(s%60).padStart(2,'0');};\
document.querySelectorAll('.player').forEach(p=>{const a=p.querySelector('audio'),el=p.querySelector('.elapsed'),tot=p.querySelector('.total');\
a.addEventListener('loadedmetadata',()=>{tot.textContent=isFinite(a.duration)&&a.duration>0?fmt(a.duration):'--:--';});\
a.addEventListener('timeupdate',()=>{el.textContent=fmt(a.currentTime);});\
a.addEventListener('play',()=>{if(current&&current!==a){current.pause();}current=a;});\
a.addEventListener('ended',()=>{if(current===a){current=null;}});});</script>";

pub async fn meditations(State(state): State<AppState>, who: AdminIdentity, RawQuery(raw): RawQuery) -> Response {
    let query = parse_list_query(raw.as_deref());
    let all = match state.repo.list(false).await {
        Ok(v) => v,
        Err(e) => {
            warn!(target: "pages", "list failed: {e}");
            return admin_page("Meditations", &who, &format!("<p class=\"err\">{}</p>", escape(e.message()))).into_response();
        }
    };
    let mut body = String::from("<h1>Meditations</h1>");
    body.push_str(&format!(
        "<form method=\"get\"><input name=\"q\" placeholder=\"Search titles\" value=\"{}\"></form>",
        escape(&query.search)
    ));
    body.push_str("<p>");
    for tag in tag_universe(&all) {
        let mut toggled = query.clone();
        toggled.toggle_tag(&tag);
        let class = if query.tags.contains(&tag) { "tag on" } else { "tag" };
        body.push_str(&format!("<a class=\"{class}\" href=\"{}\">{}</a>", escape(&list_href(&toggled)), escape(&tag)));
    }
    body.push_str("</p>");
    let mut resorted = query.clone();
    resorted.toggle_sort();
    let sort_label = match query.sort { SortOrder::Newest => "Newest first", SortOrder::Oldest => "Oldest first" };
    body.push_str(&format!("<p><a href=\"{}\">{sort_label}</a></p>", escape(&list_href(&resorted))));

    let shown = query.apply(&all);
    if shown.is_empty() {
        let msg = if all.is_empty() { "No meditations yet." } else { "No meditations match your filters." };
        body.push_str(&format!("<p class=\"muted\">{msg}</p>"));
    }
    for view in shown {
        let m = &view.meditation;
        let status = if m.published { "published" } else { "draft" };
        body.push_str(&format!(
            "<div class=\"card\"><h3><a href=\"/admin/meditations/{}\">{}</a> <span class=\"muted\">{status} · {}</span></h3>{}<p>{}</p></div>",
            m.id,
            escape(&m.title),
            m.created_at.format("%Y-%m-%d"),
            audio_html(view),
            tags_html(&m.tags)
        ));
    }
    body.push_str(PLAYER_SCRIPT);
    admin_page("Meditations", &who, &body).into_response()
}

pub async fn meditation_detail(State(state): State<AppState>, who: AdminIdentity, Path(id): Path<String>) -> Response {
    let view = match parse_id(&id) {
        Ok(id) => state.repo.get(id).await,
        Err(e) => Err(e),
    };
    let view = match view {
        Ok(v) => v,
        Err(e) => {
            let status = axum::http::StatusCode::from_u16(e.http_status()).unwrap_or(axum::http::StatusCode::NOT_FOUND);
            return (status, admin_page("Not found", &who, &format!("<p class=\"err\">{}</p>", escape(e.message())))).into_response();
        }
    };
    let m = &view.meditation;
    let body = format!(
        r#"<p><a href="/admin/meditations">← All meditations</a></p>
<h1>{title}</h1>{audio}{player}
<form id="edit"><label>Title<input name="title" value="{title}" required></label>
<label>Quote<textarea name="quote">{quote}</textarea></label>
<label>Tags (comma separated)<input name="tags" value="{tags}"></label>
<label>Transcription<textarea name="transcription" rows="8">{transcription}</textarea></label>
<label><input type="checkbox" name="published" style="display:inline;width:auto"{checked}> Published</label>
<button>Save</button> <span id="msg"></span></form>
<p><button id="del">Delete</button></p>
<script>const url='/api/admin/meditations/{id}';const msg=document.getElementById('msg');
document.getElementById('edit').addEventListener('submit',async e=>{{e.preventDefault();const f=e.target;
const body={{title:f.title.value,quote:f.quote.value,tags:f.tags.value,transcription:f.transcription.value,published:f.published.checked}};
const r=await fetch(url,{{method:'PATCH',headers:{{'content-type':'application/json'}},body:JSON.stringify(body)}});const j=await r.json().catch(()=>({{}}));
msg.textContent=r.ok?'Saved.':(j.error||'Save failed');}});
document.getElementById('del').addEventListener('click',async()=>{{if(!confirm('Delete this meditation?'))return;
const r=await fetch(url,{{method:'DELETE'}});if(r.ok){{location.href='/admin/meditations';}}else{{const j=await r.json().catch(()=>({{}}));msg.textContent=j.error||'Delete failed';}}}});</script>"#,
        title = escape(&m.title),
        audio = audio_html(&view),
        player = PLAYER_SCRIPT,
        quote = escape(m.quote.as_deref().unwrap_or("")),
        tags = escape(&m.tags.join(", ")),
        transcription = escape(m.transcription.as_deref().unwrap_or("")),
        checked = if m.published { " checked" } else { "" },
        id = m.id,
    );
    admin_page(&m.title, &who, &body).into_response()
}

const LOGIN_BODY: &str = r#"<h1>Admin Login</h1><p id="err" class="err"></p>
<form id="login"><label>Email<input type="email" name="email" required></label>
<label>Password<input type="password" name="password" required></label><button>Sign in</button></form>
<script>document.getElementById('login').addEventListener('submit',async e=>{e.preventDefault();const err=document.getElementById('err');err.textContent='';
const email=e.target.email.value,password=e.target.password.value;
try{const c=await fetch('/api/admin/check-email',{method:'POST',headers:{'content-type':'application/json'},body:JSON.stringify({email})});
const cj=await c.json();if(!cj.allowed){err.textContent='This email is not authorized.';return;}
const r=await fetch('/api/admin/login',{method:'POST',headers:{'content-type':'application/json'},body:JSON.stringify({email,password})});
if(r.ok){location.href='/admin';}else{const j=await r.json().catch(()=>({}));err.textContent=j.error||'Something went wrong. Please try again.';}}
catch(_){err.textContent='Something went wrong. Please try again.';}});</script>"#;

pub async fn login() -> Html<String> {
    page("Admin Login", LOGIN_BODY)
}

pub async fn not_authorized() -> Html<String> {
    page(
        "Not authorized",
        &format!(
            "<h1>Not authorized</h1><p>Your account is not on the admin list.</p><button onclick=\"logout()\">Sign out</button>{LOGOUT_SCRIPT}"
        ),
    )
}
