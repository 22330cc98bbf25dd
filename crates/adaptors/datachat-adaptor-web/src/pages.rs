//! Browser pages. Each page keeps its session token in localStorage and
//! renders the transcript returned by the JSON API.

const SHARED_STYLE: &str = r#"
body{font-family:system-ui,-apple-system,Segoe UI,sans-serif;max-width:860px;margin:0 auto;padding:1.5rem;color:#1f2328}
h1{font-size:1.6rem;margin-bottom:.2rem}
.sub{color:#656d76;margin-top:0}
#log{display:flex;flex-direction:column;gap:.75rem;margin:1.5rem 0}
.entry{padding:.75rem 1rem;border-radius:10px;white-space:pre-wrap;line-height:1.45}
.user{background:#ddf4ff;align-self:flex-end;max-width:80%}
.assistant{background:#f6f8fa;align-self:flex-start;max-width:90%}
.error{background:#ffebe9;border:1px solid #ff8182}
.entry img{max-width:100%;border-radius:6px;margin-top:.5rem;display:block}
.entry a.file{display:inline-block;margin-top:.4rem;margin-right:.6rem}
form{display:flex;gap:.5rem;flex-wrap:wrap;align-items:center}
input[type=text]{flex:1;min-width:240px;padding:.6rem;border:1px solid #d0d7de;border-radius:6px}
button{padding:.55rem 1rem;border-radius:6px;border:1px solid #1f883d;background:#1f883d;color:#fff;cursor:pointer}
button.secondary{background:#fff;color:#1f2328;border-color:#d0d7de}
button:disabled{opacity:.6;cursor:wait}
#status{color:#656d76;font-size:.9rem;min-height:1.2rem}
#logs{margin-top:2rem;font-family:ui-monospace,monospace;font-size:.75rem;max-height:200px;overflow:auto;background:#0d1117;color:#c9d1d9;padding:.5rem;border-radius:6px}
"#;

const SHARED_SCRIPT: &str = r#"
const TOKEN_KEY = '{TOKEN_KEY}';
let session = localStorage.getItem(TOKEN_KEY) || '';
const log = document.getElementById('log');
const statusEl = document.getElementById('status');

function fileUrl(file) {
  return '/api/files/' + encodeURIComponent(file.remoteId) + '?session=' + encodeURIComponent(session);
}

function render(entries) {
  log.innerHTML = '';
  for (const entry of entries) {
    const div = document.createElement('div');
    div.className = 'entry ' + entry.role + (entry.error ? ' error' : '');
    for (const part of entry.parts) {
      if (part.type === 'text') {
        const p = document.createElement('div');
        p.textContent = part.text;
        div.appendChild(p);
      } else if (part.type === 'image' && part.file.remoteId) {
        const img = document.createElement('img');
        img.src = fileUrl(part.file);
        img.alt = part.file.name;
        div.appendChild(img);
      } else if (part.type === 'file') {
        if (part.file.remoteId && entry.role === 'assistant') {
          const a = document.createElement('a');
          a.className = 'file';
          a.href = fileUrl(part.file);
          a.textContent = 'Download ' + part.file.name;
          div.appendChild(a);
        } else {
          const span = document.createElement('div');
          span.textContent = '\u{1F4CE} ' + part.file.name;
          div.appendChild(span);
        }
      }
    }
    log.appendChild(div);
  }
  window.scrollTo(0, document.body.scrollHeight);
}

function remember(body) {
  if (body.session) {
    session = body.session;
    localStorage.setItem(TOKEN_KEY, session);
  }
  if (body.entries) render(body.entries);
}

async function call(url, options) {
  const resp = await fetch(url, options);
  const body = await resp.json().catch(() => ({}));
  if (!resp.ok) throw new Error(body.error || ('HTTP ' + resp.status));
  return body;
}

async function loadTranscript() {
  if (!session) {
    remember(await call('/api/session', {method: 'POST'}));
    return;
  }
  remember(await call('/api/transcript?session=' + encodeURIComponent(session)));
}

if ({LOGS_ENABLED}) {
  const logs = document.getElementById('logs');
  logs.style.display = 'block';
  const es = new EventSource('/logs');
  es.onmessage = (ev) => {
    try {
      const e = JSON.parse(ev.data);
      const line = document.createElement('div');
      line.textContent = e.time + ' ' + e.level + ' ' + e.target + ': ' + e.message;
      logs.appendChild(line);
      logs.scrollTop = logs.scrollHeight;
    } catch (_) {}
  };
}
"#;

const ANALYSIS_TEMPLATE: &str = r#"<!doctype html><html><head><meta charset='utf-8'>
<title>Data Analysis Assistant</title><style>{STYLE}</style></head><body>
<h1>&#128202; Data Analysis Assistant</h1>
<p class='sub'>Upload your dataset and ask questions to analyze it.</p>
<div id='log'></div>
<div id='status'></div>
<form id='chat'>
  <input type='text' id='text' placeholder='Ask a question about your data' autocomplete='off'>
  <input type='file' id='files' multiple accept='{ACCEPT}'>
  <button type='submit' id='send'>Send</button>
  <button type='button' class='secondary' id='reset'>Clear Chat</button>
</form>
<div id='logs' style='display:none'></div>
<script>{SCRIPT}
const form = document.getElementById('chat');
const send = document.getElementById('send');
form.addEventListener('submit', async (ev) => {
  ev.preventDefault();
  const text = document.getElementById('text').value;
  const files = document.getElementById('files').files;
  const data = new FormData();
  data.append('session', session);
  data.append('text', text);
  for (const f of files) data.append('files', f, f.name);
  send.disabled = true;
  statusEl.textContent = 'Analyzing...';
  try {
    remember(await call('/api/chat', {method: 'POST', body: data}));
    document.getElementById('text').value = '';
    document.getElementById('files').value = '';
    statusEl.textContent = '';
  } catch (e) {
    statusEl.textContent = e.message;
  } finally {
    send.disabled = false;
  }
});
document.getElementById('reset').addEventListener('click', async () => {
  try {
    remember(await call('/api/reset', {
      method: 'POST',
      headers: {'content-type': 'application/json'},
      body: JSON.stringify({session})
    }));
    statusEl.textContent = '';
  } catch (e) {
    statusEl.textContent = e.message;
  }
});
loadTranscript().catch((e) => { statusEl.textContent = e.message; });
</script></body></html>"#;

const ECHO_TEMPLATE: &str = r#"<!doctype html><html><head><meta charset='utf-8'>
<title>Echo Chat</title><style>{STYLE}</style></head><body>
<h1>Echo Chat</h1>
<p class='sub'>Everything you say is repeated back.</p>
<div id='log'></div>
<div id='status'></div>
<form id='chat'>
  <input type='text' id='text' placeholder='Say something' autocomplete='off'>
  <button type='submit'>Send</button>
</form>
<div id='logs' style='display:none'></div>
<script>{SCRIPT}
document.getElementById('chat').addEventListener('submit', async (ev) => {
  ev.preventDefault();
  const text = document.getElementById('text').value;
  try {
    remember(await call('/api/echo', {
      method: 'POST',
      headers: {'content-type': 'application/json'},
      body: JSON.stringify({session, text})
    }));
    document.getElementById('text').value = '';
    statusEl.textContent = '';
  } catch (e) {
    statusEl.textContent = e.message;
  }
});
if (session) {
  call('/api/echo/transcript?session=' + encodeURIComponent(session)).then(remember).catch(() => {});
}
</script></body></html>"#;

fn script(token_key: &str, logs_enabled: bool) -> String {
    SHARED_SCRIPT
        .replace("{TOKEN_KEY}", token_key)
        .replace("{LOGS_ENABLED}", if logs_enabled { "true" } else { "false" })
}

/// Data-analysis chat page
pub fn analysis_page(accepted_extensions: &[&str], logs_enabled: bool) -> String {
    let accept = accepted_extensions
        .iter()
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(",");
    ANALYSIS_TEMPLATE
        .replace("{STYLE}", SHARED_STYLE)
        .replace("{ACCEPT}", &accept)
        .replace("{SCRIPT}", &script("datachat_session", logs_enabled))
}

/// Echo chat page
pub fn echo_page(logs_enabled: bool) -> String {
    ECHO_TEMPLATE
        .replace("{STYLE}", SHARED_STYLE)
        .replace("{SCRIPT}", &script("datachat_echo_session", logs_enabled))
}
