//! Scaffold templates for the starter project.
//!
//! Every backend contributes an entry point and a dependency manifest; every
//! frontend and database other than `None` contributes one file.

use super::code_generator::{FileOrigin, GeneratedFile};
use crate::pipeline::input::{Backend, Database, Frontend, TargetStack};

fn scaffold_file(path: &str, content: String, description: &str) -> GeneratedFile {
    GeneratedFile {
        path: path.to_string(),
        content,
        description: description.to_string(),
        origin: FileOrigin::Scaffold,
    }
}

/// Files for `target`, backend first, then frontend, then database.
pub fn scaffold(target: &TargetStack) -> Vec<GeneratedFile> {
    let mut files = backend_files(target.backend, target.database);
    files.extend(frontend_file(target.frontend));
    files.extend(database_file(target.database));
    files
}

fn python_driver(database: Database) -> Option<&'static str> {
    match database {
        Database::PostgreSql => Some("psycopg2-binary==2.9.9"),
        Database::MySql => Some("pymysql==1.1.0"),
        Database::MongoDb => Some("pymongo==4.6.0"),
        Database::Redis => Some("redis==5.0.1"),
        Database::Sqlite | Database::None => None,
    }
}

fn node_driver(database: Database) -> Option<(&'static str, &'static str)> {
    match database {
        Database::PostgreSql => Some(("pg", "^8.11.0")),
        Database::MySql => Some(("mysql2", "^3.6.0")),
        Database::MongoDb => Some(("mongoose", "^8.0.0")),
        Database::Redis => Some(("redis", "^4.6.0")),
        Database::Sqlite => Some(("better-sqlite3", "^9.2.0")),
        Database::None => None,
    }
}

fn requirements(packages: &[&str], database: Database) -> String {
    let mut lines: Vec<&str> = packages.to_vec();
    lines.extend(python_driver(database));
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn package_json(name: &str, main: &str, deps: &[(&str, &str)], database: Database) -> String {
    let mut all: Vec<(&str, &str)> = deps.to_vec();
    all.extend(node_driver(database));
    let deps = all
        .iter()
        .map(|(n, v)| format!("    \"{}\": \"{}\"", n, v))
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "{{\n  \"name\": \"{}\",\n  \"version\": \"1.0.0\",\n  \"main\": \"{}\",\n  \"dependencies\": {{\n{}\n  }}\n}}\n",
        name, main, deps
    )
}

fn backend_files(backend: Backend, database: Database) -> Vec<GeneratedFile> {
    match backend {
        Backend::FastApi => vec![
            scaffold_file("backend/app/main.py", FASTAPI_MAIN.to_string(), "FastAPI application entry point"),
            scaffold_file(
                "backend/requirements.txt",
                requirements(&["fastapi==0.104.0", "uvicorn==0.24.0", "pydantic==2.5.0"], database),
                "Python dependencies",
            ),
        ],
        Backend::Flask => vec![
            scaffold_file("backend/app.py", FLASK_APP.to_string(), "Flask application entry point"),
            scaffold_file(
                "backend/requirements.txt",
                requirements(&["flask==3.0.0", "gunicorn==21.2.0"], database),
                "Python dependencies",
            ),
        ],
        Backend::Django => vec![
            scaffold_file("backend/manage.py", DJANGO_MANAGE.to_string(), "Django management entry point"),
            scaffold_file(
                "backend/requirements.txt",
                requirements(&["django==5.0", "gunicorn==21.2.0"], database),
                "Python dependencies",
            ),
        ],
        Backend::Express => vec![
            scaffold_file("backend/src/index.js", EXPRESS_INDEX.to_string(), "Express server entry point"),
            scaffold_file(
                "backend/package.json",
                package_json("backend", "src/index.js", &[("express", "^4.18.2")], database),
                "Node.js dependencies",
            ),
        ],
        Backend::NestJs => vec![
            scaffold_file("backend/src/main.ts", NEST_MAIN.to_string(), "NestJS bootstrap"),
            scaffold_file(
                "backend/package.json",
                package_json(
                    "backend",
                    "dist/main.js",
                    &[("@nestjs/core", "^10.0.0"), ("@nestjs/common", "^10.0.0")],
                    database,
                ),
                "Node.js dependencies",
            ),
        ],
        Backend::SpringBoot => vec![
            scaffold_file(
                "backend/src/main/java/com/example/Application.java",
                SPRING_APPLICATION.to_string(),
                "Spring Boot application class",
            ),
            scaffold_file("backend/pom.xml", SPRING_POM.to_string(), "Maven build"),
        ],
        Backend::AspNetCore => vec![
            scaffold_file("backend/Program.cs", ASPNET_PROGRAM.to_string(), "ASP.NET Core minimal API"),
            scaffold_file("backend/App.csproj", ASPNET_CSPROJ.to_string(), "Project file"),
        ],
        Backend::Gin => vec![
            scaffold_file("backend/main.go", GIN_MAIN.to_string(), "Gin server entry point"),
            scaffold_file("backend/go.mod", GIN_GO_MOD.to_string(), "Go module"),
        ],
        Backend::Actix => vec![
            scaffold_file("backend/src/main.rs", ACTIX_MAIN.to_string(), "Actix Web server entry point"),
            scaffold_file("backend/Cargo.toml", ACTIX_CARGO.to_string(), "Cargo manifest"),
        ],
    }
}

fn frontend_file(frontend: Frontend) -> Option<GeneratedFile> {
    let (path, content, description) = match frontend {
        Frontend::React => ("frontend/src/App.jsx", REACT_APP, "React root component"),
        Frontend::Vue => ("frontend/src/App.vue", VUE_APP, "Vue root component"),
        Frontend::Angular => (
            "frontend/src/app/app.component.ts",
            ANGULAR_COMPONENT,
            "Angular root component",
        ),
        Frontend::Svelte => ("frontend/src/App.svelte", SVELTE_APP, "Svelte root component"),
        Frontend::NextJs => ("frontend/pages/index.js", NEXT_INDEX, "Next.js index page"),
        Frontend::None => return None,
    };
    Some(scaffold_file(path, content.to_string(), description))
}

fn database_file(database: Database) -> Option<GeneratedFile> {
    let (path, content, description) = match database {
        Database::PostgreSql => ("database/schema.sql", POSTGRES_SCHEMA, "PostgreSQL schema"),
        Database::MySql => ("database/schema.sql", MYSQL_SCHEMA, "MySQL schema"),
        Database::Sqlite => ("database/schema.sql", SQLITE_SCHEMA, "SQLite schema"),
        Database::MongoDb => ("database/init.js", MONGO_INIT, "MongoDB collection setup"),
        Database::Redis => ("database/redis.conf", REDIS_CONF, "Redis configuration"),
        Database::None => return None,
    };
    Some(scaffold_file(path, content.to_string(), description))
}

const FASTAPI_MAIN: &str = r#"import logging

from fastapi import FastAPI
from fastapi.middleware.cors import CORSMiddleware

app = FastAPI(title="Modernized API", version="1.0.0")

app.add_middleware(
    CORSMiddleware,
    allow_origins=["*"],
    allow_methods=["*"],
    allow_headers=["*"],
)

logging.basicConfig(level=logging.INFO)
logger = logging.getLogger(__name__)


@app.get("/api/items/{item_id}")
async def get_item(item_id: int):
    logger.info("Fetching item %s", item_id)
    return {"item_id": item_id}
"#;

const FLASK_APP: &str = r#"from flask import Flask, jsonify

app = Flask(__name__)


@app.get("/health")
def health():
    return jsonify(status="ok")


if __name__ == "__main__":
    app.run(host="0.0.0.0", port=8000)
"#;

const DJANGO_MANAGE: &str = r#"#!/usr/bin/env python
import os
import sys


def main():
    os.environ.setdefault("DJANGO_SETTINGS_MODULE", "config.settings")
    from django.core.management import execute_from_command_line

    execute_from_command_line(sys.argv)


if __name__ == "__main__":
    main()
"#;

const EXPRESS_INDEX: &str = r#"const express = require('express');

const app = express();
app.use(express.json());

app.get('/health', (req, res) => res.json({ status: 'ok' }));

const port = process.env.PORT || 8000;
app.listen(port, () => console.log(`listening on ${port}`));
"#;

const NEST_MAIN: &str = r#"import { NestFactory } from '@nestjs/core';
import { AppModule } from './app.module';

async function bootstrap() {
  const app = await NestFactory.create(AppModule);
  await app.listen(process.env.PORT ?? 8000);
}
bootstrap();
"#;

const SPRING_APPLICATION: &str = r#"package com.example;

import org.springframework.boot.SpringApplication;
import org.springframework.boot.autoconfigure.SpringBootApplication;

@SpringBootApplication
public class Application {
    public static void main(String[] args) {
        SpringApplication.run(Application.class, args);
    }
}
"#;

const SPRING_POM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <modelVersion>4.0.0</modelVersion>
  <parent>
    <groupId>org.springframework.boot</groupId>
    <artifactId>spring-boot-starter-parent</artifactId>
    <version>3.2.0</version>
  </parent>
  <groupId>com.example</groupId>
  <artifactId>backend</artifactId>
  <version>1.0.0</version>
  <dependencies>
    <dependency>
      <groupId>org.springframework.boot</groupId>
      <artifactId>spring-boot-starter-web</artifactId>
    </dependency>
  </dependencies>
</project>
"#;

const ASPNET_PROGRAM: &str = r#"var builder = WebApplication.CreateBuilder(args);
var app = builder.Build();

app.MapGet("/health", () => Results.Ok(new { status = "ok" }));

app.Run();
"#;

const ASPNET_CSPROJ: &str = r#"<Project Sdk="Microsoft.NET.Sdk.Web">
  <PropertyGroup>
    <TargetFramework>net8.0</TargetFramework>
    <Nullable>enable</Nullable>
  </PropertyGroup>
</Project>
"#;

const GIN_MAIN: &str = r#"package main

import "github.com/gin-gonic/gin"

func main() {
	r := gin.Default()
	r.GET("/health", func(c *gin.Context) {
		c.JSON(200, gin.H{"status": "ok"})
	})
	r.Run(":8000")
}
"#;

const GIN_GO_MOD: &str = r#"module example.com/backend

go 1.21

require github.com/gin-gonic/gin v1.9.1
"#;

const ACTIX_MAIN: &str = r#"use actix_web::{get, App, HttpResponse, HttpServer, Responder};

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    HttpServer::new(|| App::new().service(health))
        .bind(("0.0.0.0", 8000))?
        .run()
        .await
}
"#;

const ACTIX_CARGO: &str = r#"[package]
name = "backend"
version = "0.1.0"
edition = "2021"

[dependencies]
actix-web = "4"
serde_json = "1"
"#;

const REACT_APP: &str = r#"import React, { useEffect, useState } from 'react';

export default function App() {
  const [items, setItems] = useState([]);

  useEffect(() => {
    fetch('/api/items')
      .then((res) => res.json())
      .then(setItems)
      .catch((err) => console.error('Failed to fetch items:', err));
  }, []);

  return (
    <ul>
      {items.map((item) => (
        <li key={item.id}>{item.name}</li>
      ))}
    </ul>
  );
}
"#;

const VUE_APP: &str = r#"<template>
  <ul>
    <li v-for="item in items" :key="item.id">{{ item.name }}</li>
  </ul>
</template>

<script setup>
import { ref, onMounted } from 'vue';

const items = ref([]);
onMounted(async () => {
  items.value = await (await fetch('/api/items')).json();
});
</script>
"#;

const ANGULAR_COMPONENT: &str = r#"import { Component } from '@angular/core';

@Component({
  selector: 'app-root',
  template: '<h1>{{ title }}</h1>',
})
export class AppComponent {
  title = 'modernized-app';
}
"#;

const SVELTE_APP: &str = r#"<script>
  import { onMount } from 'svelte';
  let items = [];
  onMount(async () => {
    items = await (await fetch('/api/items')).json();
  });
</script>

<ul>
  {#each items as item (item.id)}
    <li>{item.name}</li>
  {/each}
</ul>
"#;

const NEXT_INDEX: &str = r#"export default function Home({ items }) {
  return (
    <ul>
      {items.map((item) => (
        <li key={item.id}>{item.name}</li>
      ))}
    </ul>
  );
}

export async function getServerSideProps() {
  const res = await fetch(`${process.env.API_URL}/api/items`);
  return { props: { items: await res.json() } };
}
"#;

const POSTGRES_SCHEMA: &str = r#"CREATE TABLE IF NOT EXISTS items (
    id SERIAL PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    description TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

const MYSQL_SCHEMA: &str = r#"CREATE TABLE IF NOT EXISTS items (
    id INT AUTO_INCREMENT PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    description TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

const SQLITE_SCHEMA: &str = r#"CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

const MONGO_INIT: &str = r#"db.createCollection('items', {
  validator: {
    $jsonSchema: {
      bsonType: 'object',
      required: ['name'],
      properties: { name: { bsonType: 'string' } },
    },
  },
});
db.items.createIndex({ name: 1 });
"#;

const REDIS_CONF: &str = r#"maxmemory 256mb
maxmemory-policy allkeys-lru
appendonly yes
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_stack_scaffold() {
        let target = TargetStack::new(Backend::FastApi)
            .with_frontend(Frontend::React)
            .with_database(Database::PostgreSql);
        let files = scaffold(&target);
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "backend/app/main.py",
                "backend/requirements.txt",
                "frontend/src/App.jsx",
                "database/schema.sql",
            ]
        );
        assert!(files[1].content.contains("psycopg2-binary"));
        assert!(files.iter().all(|f| f.origin == FileOrigin::Scaffold));
    }

    #[test]
    fn test_backend_only_scaffold() {
        let files = scaffold(&TargetStack::new(Backend::Gin));
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "backend/main.go");
    }

    #[test]
    fn test_every_backend_has_two_files() {
        for backend in [
            Backend::FastApi,
            Backend::Flask,
            Backend::Django,
            Backend::Express,
            Backend::NestJs,
            Backend::SpringBoot,
            Backend::AspNetCore,
            Backend::Gin,
            Backend::Actix,
        ] {
            let files = backend_files(backend, Database::None);
            assert_eq!(files.len(), 2, "{}", backend.as_str());
            assert!(files.iter().all(|f| !f.content.is_empty()));
        }
    }

    #[test]
    fn test_package_json_includes_driver() {
        let json = package_json("backend", "src/index.js", &[("express", "^4.18.2")], Database::MongoDb);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["dependencies"]["mongoose"], "^8.0.0");
        assert_eq!(value["dependencies"]["express"], "^4.18.2");
    }
}
