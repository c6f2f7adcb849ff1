//! Project tree fixture shared by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use tempfile::TempDir;

pub const DOCKERFILE: &str = r#"FROM python:3.11-slim AS base
WORKDIR /app
COPY requirements.txt .
RUN pip install --no-cache-dir -r requirements.txt

FROM base AS test
COPY . .
CMD ["pytest", "-q"]

FROM base AS production
COPY . .
RUN useradd -m appuser
USER appuser
EXPOSE 8080
HEALTHCHECK CMD curl -f http://localhost:8080/health || exit 1
CMD ["gunicorn", "-c", "gunicorn.conf.py", "main:app"]
"#;

pub const REQUIREMENTS: &str = "\
flask==3.0.0
openai==1.3.5
langchain==0.0.340
psycopg2-binary==2.9.9
twilio==8.10.0
gunicorn==21.2.0
python-dotenv==1.0.0
sqlalchemy==2.0.23
requests==2.31.0
redis==5.0.1
";

pub const DOCKERIGNORE: &str = ".git\n__pycache__\n*.pyc\n.env\nvenv\n";

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// A complete project that passes every check.
pub fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "Dockerfile", DOCKERFILE);
    write(root, "requirements.txt", REQUIREMENTS);
    write(root, "main.py", "from flask import Flask\napp = Flask(__name__)\n");
    write(root, "gunicorn.conf.py", "bind = '0.0.0.0:8080'\nworkers = 2\n");
    write(root, "config/settings.py", "import os\nDATABASE_URL = os.getenv('DATABASE_URL')\n");
    write(root, "services/chat.py", "def reply(text):\n    return text\n");
    write(root, "routes/health.py", "def health():\n    return {'status': 'healthy'}\n");
    write(root, "utils/helpers.py", "def noop():\n    pass\n");
    write(root, ".dockerignore", DOCKERIGNORE);
    write(root, ".env.example", "DATABASE_URL=postgresql://app@postgres/app\n");
    write(root, "docker-compose.yml", "services: {}\n");
    write(root, "README.md", "# chatbot\n");
    set_mode(root, "main.py", 0o644);
    dir
}

pub fn replace(root: &Path, rel: &str, contents: &str) {
    write(root, rel, contents);
}

pub fn remove(root: &Path, rel: &str) {
    fs::remove_file(root.join(rel)).unwrap();
}

#[cfg(unix)]
pub fn set_mode(root: &Path, rel: &str, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(root.join(rel), fs::Permissions::from_mode(mode)).unwrap();
}

#[cfg(not(unix))]
pub fn set_mode(_root: &Path, _rel: &str, _mode: u32) {}
