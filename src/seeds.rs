//! Seed data: built-in demo questions that keep the game playable
//! even without external config or a reachable generation pipeline.

use crate::domain::{Difficulty, ErrorSpec, ParsedQuestion, Question};

/// Minimal set of built-in annotated questions, one per difficulty tier.
/// The Expert entry is a deliberate trap: the code is correct and the error
/// list is empty, so the winning move is to not click at all.
pub fn seed_questions() -> Vec<Question> {
  vec![
    Question {
      title: "RAG Document Retrieval Pipeline".into(),
      difficulty: Difficulty::Beginner,
      code: vec![
        "def retrieve_documents(query, embeddings, documents, top_k=5):".into(),
        "    query_embedding = embed_query(query)".into(),
        "    similarities = cosine_similarity(query_embedding, embeddings)".into(),
        "    top_indices = <<similarities.argsort()[-top_k:]>>".into(),
        "    retrieved_docs = [documents[i] for i in top_indices]".into(),
        "    return retrieved_docs, similarities[top_indices]".into(),
      ],
      errors: vec![ErrorSpec {
        id: "similarities.argsort()[-top_k:]".into(),
        description: "argsort() returns ascending order - this picks the LOWEST similarities; reverse the slice or use argpartition".into(),
      }],
    },
    Question {
      title: "Transformer Attention Implementation".into(),
      difficulty: Difficulty::Intermediate,
      code: vec![
        "def attention(query, key, value, mask=None):".into(),
        "    d_k = query.size(-1)".into(),
        "    scores = torch.matmul(query, key.transpose(-2, -1)) / <<math.sqrt(d_k)>>".into(),
        "    if mask is not None:".into(),
        "        scores = scores.masked_fill(<<mask == 0>>, -1e9)".into(),
        "    attention_weights = F.softmax(scores, dim=-1)".into(),
        "    return torch.matmul(attention_weights, value), attention_weights".into(),
      ],
      errors: vec![
        ErrorSpec {
          id: "math.sqrt(d_k)".into(),
          description: "Should check d_k > 0 before taking sqrt to avoid domain errors".into(),
        },
        ErrorSpec {
          id: "mask == 0".into(),
          description: "Mask logic is inverted - padding positions carry mask == 1, not mask == 0".into(),
        },
      ],
    },
    Question {
      title: "Fine-tuning Hyperparameter Configuration".into(),
      difficulty: Difficulty::Advanced,
      code: vec![
        "def setup_fine_tuning(model, train_loader, epochs=10):".into(),
        "    optimizer = torch.optim.AdamW(model.parameters(), <<lr=1e-2>>)".into(),
        "    scheduler = torch.optim.lr_scheduler.StepLR(optimizer, <<step_size=1, gamma=0.1>>)".into(),
        "    for epoch in range(epochs):".into(),
        "        for batch in train_loader:".into(),
        "            optimizer.zero_grad()".into(),
        "            loss = model(batch)".into(),
        "            loss.backward()".into(),
        "            optimizer.step()".into(),
        "        scheduler.step()".into(),
      ],
      errors: vec![
        ErrorSpec {
          id: "lr=1e-2".into(),
          description: "Learning rate 1e-2 is far too high for fine-tuning; 1e-5 to 5e-5 is the stable range".into(),
        },
        ErrorSpec {
          id: "step_size=1, gamma=0.1".into(),
          description: "Cutting the LR by 90% every epoch is too aggressive; step_size of 3-5 is typical".into(),
        },
      ],
    },
    Question {
      title: "Cosine Decay Schedule".into(),
      difficulty: Difficulty::Expert,
      code: vec![
        "def cosine_decay(step, total_steps, base_lr):".into(),
        "    progress = min(step / max(1, total_steps), 1.0)".into(),
        "    return 0.5 * base_lr * (1.0 + math.cos(math.pi * progress))".into(),
      ],
      errors: vec![],
    },
  ]
}

/// Absolute last-resort fallback: a marker-free literal, so serving it can
/// never fail annotation parsing. Plays as a no-error question.
pub fn hard_fallback_parsed(difficulty: Difficulty) -> ParsedQuestion {
  let code: Vec<String> = vec![
    "def clamp(value, low, high):".into(),
    "    return max(low, min(value, high))".into(),
  ];
  ParsedQuestion {
    title: "Warmup: Read It Carefully".into(),
    difficulty,
    parsed_lines: code.clone(),
    code,
    errors: vec![],
    spans: vec![],
  }
}
